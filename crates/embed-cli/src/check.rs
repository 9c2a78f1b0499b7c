use std::io::Write;

use clap::Args;
use embed_core::{EmbedConfig, StatementCatalog};
use serde_json::json;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct CheckCatalogArgs {
    /// Print a JSON report.
    #[arg(long)]
    pub json: bool,

    /// Treat overlapping active ranges as an error.
    #[arg(long)]
    pub deny_overlaps: bool,
}

/// Summary of a configuration's catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogReport {
    pub problems: Vec<String>,
    pub ranges: usize,
    pub active: usize,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    /// `(winner, shadowed)` range ids.
    pub overlaps: Vec<(u32, u32)>,
}

impl CatalogReport {
    #[must_use]
    pub fn build(config: &EmbedConfig) -> Self {
        let problems = config.validate();
        // Validation already reported a broken catalog.
        let catalog = config.catalog().unwrap_or_else(|_| StatementCatalog::empty());
        Self {
            problems,
            ranges: catalog.len(),
            active: catalog.active().count(),
            floor: catalog.floor(),
            ceiling: catalog.ceiling(),
            overlaps: catalog
                .overlaps()
                .iter()
                .map(|o| (o.winner, o.shadowed))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_clean(&self, deny_overlaps: bool) -> bool {
        self.problems.is_empty() && !(deny_overlaps && !self.overlaps.is_empty())
    }
}

pub fn run_check_catalog(
    args: &CheckCatalogArgs,
    config: &EmbedConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let report = CatalogReport::build(config);

    if args.json {
        let value = json!({
            "ok": report.is_clean(args.deny_overlaps),
            "problems": report.problems,
            "ranges": report.ranges,
            "active": report.active,
            "floor": report.floor,
            "ceiling": report.ceiling,
            "overlaps": report
                .overlaps
                .iter()
                .map(|(winner, shadowed)| json!({ "winner": winner, "shadowed": shadowed }))
                .collect::<Vec<_>>(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "ranges: {} ({} active)", report.ranges, report.active)?;
        if let (Some(floor), Some(ceiling)) = (report.floor, report.ceiling) {
            writeln!(out, "covers: {floor} .. {ceiling}")?;
        }
        for (winner, shadowed) in &report.overlaps {
            writeln!(out, "overlap: range {shadowed} is shadowed by range {winner}")?;
        }
        for problem in &report.problems {
            writeln!(out, "problem: {problem}")?;
        }
    }

    if report.is_clean(args.deny_overlaps) {
        Ok(())
    } else {
        let count = report.problems.len()
            + if args.deny_overlaps {
                report.overlaps.len()
            } else {
                0
            };
        Err(CliError::exit(3, format!("catalog check failed ({count} issue(s))")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed_core::StatementRange;
    use pretty_assertions::assert_eq;

    fn config_with(ranges: Vec<StatementRange>) -> EmbedConfig {
        EmbedConfig {
            ranges: Some(ranges),
            ..EmbedConfig::default()
        }
    }

    #[test]
    fn builtin_catalog_is_clean() {
        let report = CatalogReport::build(&EmbedConfig::default());
        assert!(report.is_clean(true));
        assert_eq!(report.ranges, 12);
        assert_eq!(report.overlaps, vec![]);
    }

    #[test]
    fn overlaps_are_reported_and_optionally_fatal() {
        let config = config_with(vec![
            StatementRange::new(1, 10.0, 50.0, "a"),
            StatementRange::new(2, 40.0, 90.0, "b"),
        ]);
        let report = CatalogReport::build(&config);
        assert_eq!(report.overlaps, vec![(1, 2)]);
        assert!(report.is_clean(false));

        let mut out = Vec::new();
        let args = CheckCatalogArgs {
            json: false,
            deny_overlaps: true,
        };
        let err = run_check_catalog(&args, &config, &mut out).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("range 2 is shadowed by range 1"));
    }

    #[test]
    fn broken_ranges_fail_with_problem_list() {
        let config = config_with(vec![StatementRange::new(7, 90.0, 10.0, "x")]);
        let mut out = Vec::new();
        let args = CheckCatalogArgs {
            json: true,
            deny_overlaps: false,
        };
        assert!(run_check_catalog(&args, &config, &mut out).is_err());
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["ranges"], 0);
        assert!(value["problems"][0].as_str().unwrap().starts_with("ranges:"));
    }
}
