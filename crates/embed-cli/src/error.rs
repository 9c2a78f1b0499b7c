use embed_core::{AmountError, ConfigError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Amount(#[from] AmountError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{message}")]
    Exit { code: i32, message: String },
}

impl CliError {
    /// Process exit code: `2` for bad input, `3` for bad configuration.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::Amount(_) | Self::InvalidArgument { .. } => 2,
            Self::Config(_) => 3,
            _ => 1,
        }
    }

    #[must_use]
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliError;
    use embed_core::{AmountError, ConfigError};

    #[test]
    fn exit_constructor_preserves_code_and_message() {
        let error = CliError::exit(42, "boom");
        assert_eq!(error.exit_code(), 42);
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    fn input_and_config_errors_have_distinct_codes() {
        assert_eq!(CliError::from(AmountError::NotPositive(-1.0)).exit_code(), 2);
        assert_eq!(CliError::invalid("x").exit_code(), 2);
        let config = CliError::from(ConfigError::Invalid(vec!["pipeline.timeout_ms: zero".into()]));
        assert_eq!(config.exit_code(), 3);
    }
}
