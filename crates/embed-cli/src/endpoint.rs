use std::io::Write;

use clap::Args;
use embed_core::EmbedConfig;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct EndpointArgs {
    /// Query string as the service would receive it, e.g. `amount=40&type=one-time`.
    pub query: String,

    /// Override `endpoint.max_amount`.
    #[arg(long)]
    pub max_amount: Option<f64>,

    /// Exit with code 4 when the reply is not `200`.
    #[arg(long)]
    pub fail_on_error: bool,
}

/// Answer one `GET /impact` query and print `HTTP <status>` plus the JSON body.
pub fn run_endpoint(
    args: &EndpointArgs,
    config: &EmbedConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let mut endpoint = config.endpoint()?;
    if let Some(max) = args.max_amount {
        if !(max.is_finite() && max > 0.0) {
            return Err(CliError::invalid(format!(
                "--max-amount must be a positive number, got {max}"
            )));
        }
        endpoint = endpoint.with_max_amount(max);
    }

    let reply = endpoint.handle(&args.query);
    tracing::info!(
        target: "embed_cli",
        status = reply.status,
        query = %args.query,
        "endpoint reply"
    );
    writeln!(out, "HTTP {}", reply.status)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&reply.body)?)?;

    if args.fail_on_error && !reply.is_success() {
        return Err(CliError::exit(4, format!("endpoint answered {}", reply.status)));
    }
    Ok(())
}
