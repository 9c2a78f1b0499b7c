#![forbid(unsafe_code)]

//! Statement catalog: ordered amount ranges mapped to statement templates.
//!
//! Lookup is a stable, order-preserving scan over the active ranges, so a
//! misconfigured catalog with overlapping ranges still resolves
//! deterministically to the earliest-registered match. Overlaps are reported
//! when the catalog is built (see [`StatementCatalog::overlaps`]).
//!
//! # Loading
//!
//! ```toml
//! [[ranges]]
//! id = 1
//! min_amount = 1
//! max_amount = 14
//! template = "£{amount} will help provide vital information."
//! ```
//!
//! JSON input accepts either a bare array of ranges or `{"ranges": [...]}`,
//! and the camelCase field names used by the admin surface
//! (`minAmount`, `maxAmount`, `statement`, `isActive`).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{CatalogError, ConfigError};

/// One configured amount range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRange {
    pub id: u32,
    #[serde(alias = "minAmount")]
    pub min_amount: f64,
    #[serde(alias = "maxAmount")]
    pub max_amount: f64,
    /// Statement text; `{amount}` is replaced with the literal amount.
    #[serde(alias = "statement")]
    pub template: String,
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl StatementRange {
    /// Build an active range.
    pub fn new(id: u32, min_amount: f64, max_amount: f64, template: impl Into<String>) -> Self {
        Self {
            id,
            min_amount,
            max_amount,
            template: template.into(),
            active: true,
        }
    }

    /// Mark the range inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Inclusive containment check.
    #[must_use]
    pub fn contains(&self, amount: f64) -> bool {
        self.min_amount <= amount && amount <= self.max_amount
    }

    fn intersects(&self, other: &Self) -> bool {
        self.min_amount <= other.max_amount && other.min_amount <= self.max_amount
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if !self.min_amount.is_finite() || !self.max_amount.is_finite() {
            return Err(CatalogError::NonFiniteBound { id: self.id });
        }
        if self.min_amount > self.max_amount {
            return Err(CatalogError::InvertedRange {
                id: self.id,
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        if self.template.trim().is_empty() {
            return Err(CatalogError::EmptyTemplate { id: self.id });
        }
        Ok(())
    }
}

/// Two active ranges whose bounds intersect.
///
/// `winner` is the range returned by lookup for amounts in the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOverlap {
    pub winner: u32,
    pub shadowed: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangesDocument {
    Bare(Vec<StatementRange>),
    Wrapped { ranges: Vec<StatementRange> },
}

impl RangesDocument {
    fn into_ranges(self) -> Vec<StatementRange> {
        match self {
            Self::Bare(ranges) | Self::Wrapped { ranges } => ranges,
        }
    }
}

/// Ordered set of statement ranges. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementCatalog {
    ranges: Vec<StatementRange>,
    overlaps: Vec<RangeOverlap>,
}

impl StatementCatalog {
    /// Build a catalog, validating each range.
    ///
    /// Registration order is preserved. Overlapping active ranges are not an
    /// error; they are recorded and logged at `warn`.
    pub fn new(ranges: Vec<StatementRange>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(ranges.len());
        for range in &ranges {
            range.validate()?;
            if !seen.insert(range.id) {
                return Err(CatalogError::DuplicateId { id: range.id });
            }
        }

        let overlaps = find_overlaps(&ranges);
        for overlap in &overlaps {
            tracing::warn!(
                target: "embed.catalog",
                winner = overlap.winner,
                shadowed = overlap.shadowed,
                "overlapping active ranges; earliest registered range wins"
            );
        }
        tracing::debug!(
            target: "embed.catalog",
            ranges = ranges.len(),
            active = ranges.iter().filter(|r| r.active).count(),
            "statement catalog loaded"
        );

        Ok(Self { ranges, overlaps })
    }

    /// An empty catalog. Every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ranges: Vec::new(),
            overlaps: Vec::new(),
        }
    }

    /// The default twelve-range catalog covering £1 to £10,000.
    #[must_use]
    pub fn builtin() -> Self {
        let ranges = BUILTIN_RANGES
            .iter()
            .map(|&(id, min, max, template)| StatementRange::new(id, min, max, template))
            .collect();
        Self {
            ranges,
            overlaps: Vec::new(),
        }
    }

    /// Parse a TOML document with a `[[ranges]]` array.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(default)]
            ranges: Vec<StatementRange>,
        }
        let doc: Doc = toml::from_str(s)?;
        Ok(Self::new(doc.ranges)?)
    }

    /// Parse a JSON array of ranges, or an object with a `ranges` array.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let doc: RangesDocument = serde_json::from_str(s)?;
        Ok(Self::new(doc.into_ranges())?)
    }

    /// Load from a file, choosing the format from the extension
    /// (`.json` is JSON, anything else is TOML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// First active range containing `amount`, in registration order.
    #[must_use]
    pub fn lookup(&self, amount: Amount) -> Option<&StatementRange> {
        let value = amount.get();
        self.active().find(|range| range.contains(value))
    }

    /// Active ranges in registration order.
    pub fn active(&self) -> impl Iterator<Item = &StatementRange> + '_ {
        self.ranges.iter().filter(|range| range.active)
    }

    /// All ranges, including inactive ones.
    #[must_use]
    pub fn ranges(&self) -> &[StatementRange] {
        &self.ranges
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&StatementRange> {
        self.ranges.iter().find(|range| range.id == id)
    }

    /// Highest `max_amount` among active ranges.
    #[must_use]
    pub fn ceiling(&self) -> Option<f64> {
        self.active().map(|range| range.max_amount).reduce(f64::max)
    }

    /// Lowest `min_amount` among active ranges.
    #[must_use]
    pub fn floor(&self) -> Option<f64> {
        self.active().map(|range| range.min_amount).reduce(f64::min)
    }

    #[must_use]
    pub fn overlaps(&self) -> &[RangeOverlap] {
        &self.overlaps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Default for StatementCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn find_overlaps(ranges: &[StatementRange]) -> Vec<RangeOverlap> {
    let active: Vec<&StatementRange> = ranges.iter().filter(|r| r.active).collect();
    let mut overlaps = Vec::new();
    for (i, earlier) in active.iter().enumerate() {
        for later in &active[i + 1..] {
            if earlier.intersects(later) {
                overlaps.push(RangeOverlap {
                    winner: earlier.id,
                    shadowed: later.id,
                });
            }
        }
    }
    overlaps
}

const BUILTIN_RANGES: &[(u32, f64, f64, &str)] = &[
    (
        1,
        1.0,
        14.0,
        "£{amount} will help provide vital information and support to someone affected by cancer.",
    ),
    (
        2,
        15.0,
        19.0,
        "£{amount} could help a member of our Cancer Information team provide support and information to someone affected by cancer for 15 minutes.",
    ),
    (
        3,
        20.0,
        24.0,
        "£{amount} could help pay for a specialist nurse for 20 minutes, providing expert care and support.",
    ),
    (
        4,
        25.0,
        39.0,
        "£{amount} could help fund a specialist nurse for one hour, helping someone living with cancer and their family.",
    ),
    (
        5,
        40.0,
        49.0,
        "£{amount} could help provide a care package for someone recently diagnosed with cancer.",
    ),
    (
        6,
        50.0,
        74.0,
        "£{amount} could help pay for a support worker for two hours, helping people with cancer navigate the benefits system.",
    ),
    (
        7,
        75.0,
        99.0,
        "£{amount} could help fund vital cancer support services for a day.",
    ),
    (
        8,
        100.0,
        149.0,
        "£{amount} could help fund specialist cancer support for someone who has no one else to turn to.",
    ),
    (
        9,
        150.0,
        249.0,
        "£{amount} could help provide emotional support through our online community for a month.",
    ),
    (
        10,
        250.0,
        499.0,
        "£{amount} could help answer calls on the Support Line for one hour, providing support when it's needed most.",
    ),
    (
        11,
        500.0,
        999.0,
        "£{amount} could help provide financial guidance to families affected by cancer for a full day.",
    ),
    (
        12,
        1000.0,
        10000.0,
        "£{amount} will make a transformational difference to people affected by cancer. Your incredible generosity will help us be there for everyone who needs us.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn amount(v: f64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[test]
    fn builtin_lookup_hits_inclusive_bounds() {
        let catalog = StatementCatalog::builtin();
        assert_eq!(catalog.lookup(amount(40.0)).map(|r| r.id), Some(5));
        assert_eq!(catalog.lookup(amount(49.0)).map(|r| r.id), Some(5));
        assert_eq!(catalog.lookup(amount(50.0)).map(|r| r.id), Some(6));
        assert_eq!(catalog.lookup(amount(1.0)).map(|r| r.id), Some(1));
        assert_eq!(catalog.lookup(amount(10_000.0)).map(|r| r.id), Some(12));
        assert!(catalog.lookup(amount(10_000.5)).is_none());
        assert!(catalog.lookup(amount(0.5)).is_none());
        assert!(catalog.overlaps().is_empty());
    }

    #[test]
    fn fractional_amount_in_gap_misses() {
        let catalog = StatementCatalog::builtin();
        assert!(catalog.lookup(amount(14.5)).is_none());
    }

    #[test]
    fn inactive_ranges_are_skipped() {
        let catalog = StatementCatalog::new(vec![
            StatementRange::new(1, 1.0, 10.0, "a {amount}").inactive(),
            StatementRange::new(2, 5.0, 20.0, "b {amount}"),
        ])
        .unwrap();
        assert_eq!(catalog.lookup(amount(7.0)).map(|r| r.id), Some(2));
        assert_eq!(catalog.lookup(amount(3.0)), None);
        assert_eq!(catalog.ceiling(), Some(20.0));
        assert_eq!(catalog.floor(), Some(5.0));
        assert!(catalog.overlaps().is_empty());
    }

    #[test]
    fn overlapping_ranges_resolve_to_earliest_registered() {
        let catalog = StatementCatalog::new(vec![
            StatementRange::new(7, 10.0, 30.0, "first"),
            StatementRange::new(3, 20.0, 40.0, "second"),
        ])
        .unwrap();
        assert_eq!(catalog.lookup(amount(25.0)).map(|r| r.id), Some(7));
        assert_eq!(catalog.lookup(amount(35.0)).map(|r| r.id), Some(3));
        assert_eq!(
            catalog.overlaps(),
            &[RangeOverlap {
                winner: 7,
                shadowed: 3
            }]
        );
    }

    #[test]
    fn rejects_inverted_and_duplicate_ranges() {
        let inverted = StatementCatalog::new(vec![StatementRange::new(1, 10.0, 5.0, "x")]);
        assert_eq!(
            inverted,
            Err(CatalogError::InvertedRange {
                id: 1,
                min: 10.0,
                max: 5.0
            })
        );

        let dup = StatementCatalog::new(vec![
            StatementRange::new(1, 1.0, 5.0, "x"),
            StatementRange::new(1, 6.0, 9.0, "y"),
        ]);
        assert_eq!(dup, Err(CatalogError::DuplicateId { id: 1 }));

        let empty = StatementCatalog::new(vec![StatementRange::new(4, 1.0, 5.0, "  ")]);
        assert_eq!(empty, Err(CatalogError::EmptyTemplate { id: 4 }));
    }

    #[test]
    fn loads_toml_ranges() {
        let catalog = StatementCatalog::from_toml_str(
            r#"
            [[ranges]]
            id = 1
            min_amount = 1
            max_amount = 9
            template = "£{amount} small"

            [[ranges]]
            id = 2
            min_amount = 10
            max_amount = 99
            template = "£{amount} medium"
            active = false
            "#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.active().count(), 1);
        assert_eq!(catalog.get(2).map(|r| r.active), Some(false));
    }

    #[test]
    fn loads_json_in_admin_shape() {
        let json = r#"[
            {"id": 1, "minAmount": 1, "maxAmount": 14, "statement": "£{amount} a", "isActive": true},
            {"id": 2, "minAmount": 15, "maxAmount": 19, "statement": "£{amount} b", "isActive": false}
        ]"#;
        let catalog = StatementCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.ranges()[0].template, "£{amount} a");
        assert_eq!(catalog.active().count(), 1);

        let wrapped = format!(r#"{{"ranges": {json}}}"#);
        assert_eq!(StatementCatalog::from_json_str(&wrapped).unwrap(), catalog);
    }

    #[test]
    fn file_loading_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("ranges.json");
        std::fs::write(
            &json_path,
            r#"{"ranges":[{"id":1,"min_amount":1,"max_amount":2,"template":"t"}]}"#,
        )
        .unwrap();
        assert_eq!(StatementCatalog::from_file(&json_path).unwrap().len(), 1);

        let missing = StatementCatalog::from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
