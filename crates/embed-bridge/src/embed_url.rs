#![forbid(unsafe_code)]

//! Query parameters accepted by the embed page: `?amount=<int>&type=<cadence>`.
//!
//! Both are optional seeds for the widget's initial state. Values that do
//! not parse are dropped rather than rejected, so a bad link still renders
//! the widget with defaults.

use embed_core::Cadence;
use embed_core::query;
use url::{ParseError, form_urlencoded};

/// Initial widget state carried on the iframe URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbedParams {
    pub amount: Option<u32>,
    pub cadence: Option<Cadence>,
}

impl EmbedParams {
    #[must_use]
    pub const fn new(amount: Option<u32>, cadence: Option<Cadence>) -> Self {
        Self { amount, cadence }
    }

    /// `amount=25&type=monthly`, omitting absent values. Empty when both are absent.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(amount) = self.amount {
            query.append_pair("amount", &amount.to_string());
        }
        if let Some(cadence) = self.cadence {
            query.append_pair("type", cadence.as_str());
        }
        query.finish()
    }

    /// Append the parameters to `base`, keeping any query it already has and
    /// any fragment after them.
    pub fn apply_to(&self, base: &str) -> Result<String, ParseError> {
        let amount = self.amount.map(|a| a.to_string());
        let pairs = amount
            .as_deref()
            .map(|a| ("amount", a))
            .into_iter()
            .chain(self.cadence.map(|c| ("type", c.as_str())));
        query::append_pairs(base, pairs)
    }

    /// Parse a query string (leading `?` optional).
    ///
    /// `amount` takes the integer part of a positive number, like a lenient
    /// integer parse would; zero, negatives and junk are dropped.
    #[must_use]
    pub fn from_query(raw: &str) -> Self {
        let amount = query::first(raw, "amount").as_deref().and_then(parse_amount);
        let cadence = query::first(raw, "type").and_then(|t| t.parse().ok());
        Self { amount, cadence }
    }

    /// Parameters carried by a full (or relative) embed URL.
    pub fn from_url(raw: &str) -> Result<Self, ParseError> {
        Ok(Self::from_query(&query::query_of(raw)?))
    }

    /// Amount as a float, for feeding the pipeline.
    #[must_use]
    pub fn amount_f64(&self) -> Option<f64> {
        self.amount.map(f64::from)
    }
}

fn parse_amount(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let whole = raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 1.0 && *v <= f64::from(u32::MAX))
            .map(|v| v.trunc() as u32)
    })?;
    (whole > 0).then_some(whole)
}
