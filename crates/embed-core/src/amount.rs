#![forbid(unsafe_code)]

//! Validated donation amounts and cadences.
//!
//! An [`Amount`] can only be built from a finite, strictly positive number,
//! so every downstream component (catalog, resolver, coordinator) works with
//! inputs that are already known to be well formed.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AmountError;

/// A finite, strictly positive amount in currency units. Fractions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Amount(f64);

impl Amount {
    /// Validate a raw amount.
    pub fn new(raw: f64) -> Result<Self, AmountError> {
        if !raw.is_finite() {
            return Err(AmountError::NotFinite(raw));
        }
        if raw <= 0.0 {
            return Err(AmountError::NotPositive(raw));
        }
        Ok(Self(raw))
    }

    /// The underlying value.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Annualised value for a monthly cadence.
    #[must_use]
    pub fn annual(self) -> f64 {
        self.0 * 12.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64 Display already prints `40` for 40.0 and `12.5` for 12.5.
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for Amount {
    type Error = AmountError;

    fn try_from(raw: f64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Donation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    #[default]
    OneTime,
    Monthly,
}

impl Cadence {
    /// Wire representation (`one-time` / `monthly`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one-time",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown donation type: {0:?}")]
pub struct ParseCadenceError(pub String);

impl FromStr for Cadence {
    type Err = ParseCadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(Self::OneTime),
            "monthly" => Ok(Self::Monthly),
            other => Err(ParseCadenceError(other.to_owned())),
        }
    }
}
