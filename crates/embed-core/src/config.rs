#![forbid(unsafe_code)]

//! Deployment configuration for the widget core.
//!
//! Every section is optional; missing fields fall back to defaults, so a
//! partial file only overrides what it names.
//!
//! # Example
//!
//! ```toml
//! [pipeline]
//! strategy = "remote"
//! endpoint = "https://widget.example/api/impact"
//! debounce_ms = 300
//! timeout_ms = 4000
//!
//! [templates]
//! generic = "£{amount} really helps."
//!
//! [endpoint]
//! max_amount = 5000
//!
//! [[ranges]]
//! id = 1
//! min_amount = 1
//! max_amount = 49
//! template = "£{amount} could fund a helpline call."
//! ```
//!
//! Without a `ranges` key the builtin catalog is used. An explicit empty
//! list yields an empty catalog.

use core::time::Duration;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{StatementCatalog, StatementRange};
use crate::coordinator::{CoordinatorConfig, DEFAULT_DEBOUNCE, DEFAULT_RESPONSE_TIMEOUT};
use crate::endpoint::{DEFAULT_MAX_AMOUNT, ImpactEndpoint};
use crate::error::{CatalogError, ConfigError};
use crate::pipeline::{ImpactPipeline, ResolutionStrategy};
use crate::query;
use crate::resolver::{ImpactResolver, StatementTemplates};

/// Upper bound accepted for `pipeline.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Selects [`ResolutionStrategy`] in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Local,
    Remote,
}

/// `[pipeline]`: request coordination and resolution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub strategy: StrategyKind,
    /// Statement service URL; required for the remote strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub debounce_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Local,
            endpoint: None,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// `[endpoint]`: server-side query limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    pub max_amount: f64,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub pipeline: PipelineSection,
    pub templates: StatementTemplates,
    pub endpoint: EndpointSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<StatementRange>>,
}

impl EmbedConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        tracing::debug!(
            target: "embed.catalog",
            path = %path.display(),
            strategy = ?config.pipeline.strategy,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.pipeline.strategy == StrategyKind::Remote
            && self
                .pipeline
                .endpoint
                .as_deref()
                .is_none_or(|e| e.trim().is_empty())
        {
            errors.push("pipeline.endpoint is required for the remote strategy".into());
        }
        if let Some(endpoint) = self.pipeline.endpoint.as_deref().filter(|e| !e.trim().is_empty())
            && let Err(err) = query::parse_reference(endpoint)
        {
            errors.push(format!("pipeline.endpoint is not a valid URL: {err}"));
        }
        if self.pipeline.debounce_ms > MAX_DEBOUNCE_MS {
            errors.push(format!(
                "pipeline.debounce_ms must be <= {MAX_DEBOUNCE_MS}, got {}",
                self.pipeline.debounce_ms
            ));
        }
        if self.pipeline.timeout_ms == 0 {
            errors.push("pipeline.timeout_ms must be > 0".into());
        }
        if !(self.endpoint.max_amount.is_finite() && self.endpoint.max_amount > 0.0) {
            errors.push(format!(
                "endpoint.max_amount must be a positive number, got {}",
                self.endpoint.max_amount
            ));
        }
        errors.extend(self.templates.validate());
        if let Err(err) = self.catalog() {
            errors.push(format!("ranges: {err}"));
        }

        errors
    }

    fn ensure_valid(&self) -> Result<(), ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// The configured catalog, or the builtin one when `ranges` is absent.
    pub fn catalog(&self) -> Result<StatementCatalog, CatalogError> {
        match &self.ranges {
            Some(ranges) => StatementCatalog::new(ranges.clone()),
            None => Ok(StatementCatalog::builtin()),
        }
    }

    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            debounce: Duration::from_millis(self.pipeline.debounce_ms),
            response_timeout: Duration::from_millis(self.pipeline.timeout_ms),
        }
    }

    /// Remote only when an endpoint is configured.
    #[must_use]
    pub fn strategy(&self) -> ResolutionStrategy {
        match (self.pipeline.strategy, &self.pipeline.endpoint) {
            (StrategyKind::Remote, Some(endpoint)) => ResolutionStrategy::Remote {
                endpoint: endpoint.clone(),
            },
            _ => ResolutionStrategy::Local,
        }
    }

    pub fn resolver(&self) -> Result<ImpactResolver, ConfigError> {
        self.ensure_valid()?;
        Ok(ImpactResolver::new(self.catalog()?).with_templates(self.templates.clone()))
    }

    pub fn pipeline(&self) -> Result<ImpactPipeline, ConfigError> {
        Ok(ImpactPipeline::new(
            self.resolver()?,
            self.strategy(),
            self.coordinator_config(),
        ))
    }

    pub fn endpoint(&self) -> Result<ImpactEndpoint, ConfigError> {
        Ok(ImpactEndpoint::new(self.resolver()?).with_max_amount(self.endpoint.max_amount))
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn default_validates_clean() {
        let config = EmbedConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.catalog().unwrap().len(), 12);
        assert_eq!(config.strategy(), ResolutionStrategy::Local);
        assert_eq!(config.coordinator_config(), CoordinatorConfig::default());
    }

    #[test]
    fn partial_override_preserves_defaults() {
        let config = EmbedConfig::from_toml_str(
            r#"
            [pipeline]
            debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.debounce_ms, 250);
        assert_eq!(config.pipeline.timeout_ms, 5_000);
        assert_eq!(config.templates, StatementTemplates::default());
        assert_eq!(config.endpoint.max_amount, 10_000.0);
        assert!(config.ranges.is_none());
    }

    #[test]
    fn remote_without_endpoint_is_invalid() {
        let config = EmbedConfig::from_toml_str("[pipeline]\nstrategy = \"remote\"\n").unwrap();
        assert_eq!(
            config.validate(),
            vec!["pipeline.endpoint is required for the remote strategy".to_string()]
        );
        assert_eq!(config.strategy(), ResolutionStrategy::Local);
        assert!(matches!(config.pipeline(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_endpoint_is_invalid() {
        let config = EmbedConfig::from_toml_str(
            "[pipeline]\nstrategy = \"remote\"\nendpoint = \"http://[::1/impact\"\n",
        )
        .unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].starts_with("pipeline.endpoint is not a valid URL"));
    }

    #[test]
    fn multiple_validation_errors_collected() {
        let mut config = EmbedConfig::default();
        config.pipeline.debounce_ms = 60_000;
        config.pipeline.timeout_ms = 0;
        config.endpoint.max_amount = -1.0;
        config.templates.generic = "no placeholder".into();
        config.ranges = Some(vec![StatementRange::new(1, 50.0, 10.0, "£{amount}")]);
        let errors = config.validate();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors[4].starts_with("ranges: range 1"));
    }

    #[test]
    fn explicit_ranges_replace_builtin() {
        let config = EmbedConfig::from_json_str(
            r#"{
                "pipeline": { "strategy": "remote", "endpoint": "/api/impact" },
                "ranges": [
                    { "id": 7, "minAmount": 1, "maxAmount": 99, "statement": "£{amount} helps", "isActive": true }
                ]
            }"#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            config.strategy(),
            ResolutionStrategy::Remote {
                endpoint: "/api/impact".into()
            }
        );
        assert!(config.pipeline().is_ok());

        let empty = EmbedConfig::from_toml_str("ranges = []\n").unwrap();
        assert!(empty.catalog().unwrap().is_empty());
    }

    #[test]
    fn endpoint_uses_configured_limit() {
        let config = EmbedConfig::from_toml_str("[endpoint]\nmax_amount = 100\n").unwrap();
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.handle("amount=150").status, 400);
        assert_eq!(endpoint.handle("amount=50").status, 200);
    }

    #[test]
    fn loads_from_file_by_extension() {
        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(toml_file, "[pipeline]\ntimeout_ms = 1500").unwrap();
        let config = EmbedConfig::from_file(toml_file.path()).unwrap();
        assert_eq!(config.pipeline.timeout_ms, 1_500);

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json_file, r#"{{"endpoint":{{"max_amount":250}}}}"#).unwrap();
        let config = EmbedConfig::from_file(json_file.path()).unwrap();
        assert_eq!(config.endpoint.max_amount, 250.0);

        let missing = EmbedConfig::from_file("/definitely/not/here.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn toml_round_trip_preserves_sections() {
        let mut config = EmbedConfig::default();
        config.pipeline.strategy = StrategyKind::Remote;
        config.pipeline.endpoint = Some("https://svc.example/impact".into());
        let text = config.to_toml_string().unwrap();
        assert_eq!(EmbedConfig::from_toml_str(&text).unwrap(), config);
    }
}
