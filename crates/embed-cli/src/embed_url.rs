use std::io::Write;

use clap::Args;
use embed_bridge::EmbedParams;
use embed_core::Cadence;
use serde_json::json;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct EmbedUrlArgs {
    /// Widget page URL to extend, or the URL to decode with `--parse`.
    pub url: String,

    /// Initial amount (whole pounds).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub amount: Option<u32>,

    /// Initial donation type.
    #[arg(long = "type")]
    pub cadence: Option<Cadence>,

    /// Decode the parameters the widget would read from `url`.
    #[arg(long, conflicts_with_all = ["amount", "cadence"])]
    pub parse: bool,
}

pub fn run_embed_url(args: &EmbedUrlArgs, out: &mut dyn Write) -> Result<()> {
    if args.url.trim().is_empty() {
        return Err(CliError::invalid("url must not be empty"));
    }

    let invalid_url = |err| CliError::invalid(format!("invalid url {:?}: {err}", args.url));
    if args.parse {
        let params = EmbedParams::from_url(&args.url).map_err(invalid_url)?;
        let value = json!({
            "amount": params.amount,
            "type": params.cadence,
        });
        writeln!(out, "{value}")?;
    } else {
        let params = EmbedParams::new(args.amount, args.cadence);
        let url = params.apply_to(&args.url).map_err(invalid_url)?;
        writeln!(out, "{url}")?;
    }
    Ok(())
}
