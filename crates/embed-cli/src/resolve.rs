use std::io::Write;
use std::time::Duration;

use clap::Args;
use embed_core::remote::parse_response;
use embed_core::{
    Amount, Cadence, EmbedConfig, ImpactQuery, ImpactResponse, RemoteFailure, ResolutionStrategy,
    ResolvedStatement,
};
use reqwest::blocking::Client;
use serde_json::json;

use crate::error::Result;

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    /// Donation amount.
    #[arg(allow_negative_numbers = true)]
    pub amount: f64,

    /// `one-time` or `monthly`.
    #[arg(long = "type", default_value = "one-time")]
    pub cadence: Cadence,

    /// Statement service to query instead of the configured strategy.
    #[arg(long)]
    pub remote: Option<String>,

    /// Remote timeout; defaults to `pipeline.timeout_ms`.
    #[arg(long = "timeout-ms", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Print a JSON object instead of the bare statement.
    #[arg(long)]
    pub json: bool,
}

pub fn run_resolve(args: &ResolveArgs, config: &EmbedConfig, out: &mut dyn Write) -> Result<()> {
    let amount = Amount::new(args.amount)?;
    let resolver = config.resolver()?;
    let endpoint = args.remote.clone().or_else(|| match config.strategy() {
        ResolutionStrategy::Remote { endpoint } => Some(endpoint),
        ResolutionStrategy::Local => None,
    });

    let statement = match endpoint {
        // Monthly text never comes from the service.
        Some(endpoint) if args.cadence == Cadence::OneTime => {
            let timeout =
                Duration::from_millis(args.timeout_ms.unwrap_or(config.pipeline.timeout_ms));
            let outcome = fetch_remote(&endpoint, ImpactQuery::new(amount, args.cadence), timeout);
            resolver.settle_remote(amount, args.cadence, outcome)
        }
        _ => resolver.resolve(amount, args.cadence),
    };

    write_statement(out, amount, args.cadence, &statement, args.json)
}

/// One blocking `GET` against the statement service.
pub fn fetch_remote(
    endpoint: &str,
    query: ImpactQuery,
    timeout: Duration,
) -> std::result::Result<ImpactResponse, RemoteFailure> {
    let url = query.url(endpoint)?;
    tracing::debug!(
        target: "embed_cli",
        %url,
        timeout_ms = timeout.as_millis() as u64,
        "fetching statement"
    );
    let client = Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(2)))
        .timeout(timeout)
        .build()
        .map_err(|err| RemoteFailure::Transport(err.to_string()))?;
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .map_err(transport_failure)?;
    let status = response.status().as_u16();
    let body = response.text().map_err(transport_failure)?;
    parse_response(status, &body)
}

fn transport_failure(err: reqwest::Error) -> RemoteFailure {
    if err.is_timeout() {
        RemoteFailure::TimedOut
    } else {
        RemoteFailure::Transport(err.to_string())
    }
}

fn write_statement(
    out: &mut dyn Write,
    amount: Amount,
    cadence: Cadence,
    statement: &ResolvedStatement,
    as_json: bool,
) -> Result<()> {
    if as_json {
        let value = json!({
            "amount": amount.get(),
            "donationType": cadence,
            "statement": statement.text,
            "rangeId": statement.source_range_id,
            "isFallback": statement.is_fallback,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "{}", statement.text)?;
    }
    Ok(())
}
