use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use embed_core::EmbedConfig;

use crate::check::{CheckCatalogArgs, run_check_catalog};
use crate::embed_url::{EmbedUrlArgs, run_embed_url};
use crate::endpoint::{EndpointArgs, run_endpoint};
use crate::error::Result;
use crate::logging::{LogConfig, init_logging};
use crate::resolve::{ResolveArgs, run_resolve};
use crate::simulate::{SimulateArgs, run_simulate};

#[derive(Debug, Parser)]
#[command(
    name = "embedctl",
    about = "Resolve impact statements, check catalogs and simulate the donation widget",
    version
)]
pub struct Cli {
    /// Configuration file (`.toml` or `.json`); builtin defaults when omitted.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON on stderr.
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    /// Increase log verbosity (`-v` info, `-vv` debug, `-vvv` trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the statement for one amount.
    Resolve(ResolveArgs),

    /// Validate the configured catalog and report overlaps.
    #[command(name = "check-catalog")]
    CheckCatalog(CheckCatalogArgs),

    /// Answer a `GET /impact` query string.
    Endpoint(EndpointArgs),

    /// Build or decode a widget embed URL.
    #[command(name = "embed-url")]
    EmbedUrl(EmbedUrlArgs),

    /// Replay a timed input script through the debounced pipeline.
    Simulate(SimulateArgs),
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose, cli.log_json));
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with_output(cli, &mut out)?;
    out.flush()?;
    Ok(())
}

pub fn run_with_output(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Resolve(args) => run_resolve(&args, &config, out),
        Commands::CheckCatalog(args) => run_check_catalog(&args, &config, out),
        Commands::Endpoint(args) => run_endpoint(&args, &config, out),
        Commands::EmbedUrl(args) => run_embed_url(&args, out),
        Commands::Simulate(args) => run_simulate(&args, &config, out),
    }
}

/// Load without validating; each command decides how strict to be.
pub fn load_config(path: Option<&Path>) -> Result<EmbedConfig> {
    match path {
        Some(path) => Ok(EmbedConfig::from_file(path)?),
        None => Ok(EmbedConfig::default()),
    }
}
