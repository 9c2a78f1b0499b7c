#![forbid(unsafe_code)]

//! `embedctl`: operator tooling for the embeddable impact widget.

pub mod check;
pub mod cli;
pub mod embed_url;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod resolve;
pub mod simulate;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{CliError, Result};
