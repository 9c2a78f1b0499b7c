#![forbid(unsafe_code)]

//! Wire codec for cross-window messages.
//!
//! Messages are JSON objects discriminated by `type`:
//!
//! ```json
//! {"type":"widget-resize","height":812}
//! {"type":"donation-complete","amount":40,"donationId":"don_123","timestamp":"2025-01-01T12:00:00.000Z"}
//! ```
//!
//! Receivers decode with [`BridgeMessage::decode`], which never fails: unknown
//! discriminants and malformed payloads are reported as [`Decoded`] variants
//! for the caller to log and drop.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const WIDGET_RESIZE: &str = "widget-resize";
pub const DONATION_COMPLETE: &str = "donation-complete";

/// Terminal business event reported by the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationComplete {
    pub amount: f64,
    pub donation_id: String,
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
}

impl DonationComplete {
    #[must_use]
    pub fn new(amount: f64, donation_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            amount,
            donation_id: donation_id.into(),
            timestamp,
        }
    }

    /// Stamp with the current wall clock.
    #[must_use]
    pub fn now(amount: f64, donation_id: impl Into<String>) -> Self {
        Self::new(amount, donation_id, Utc::now())
    }
}

/// One bridge message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeMessage {
    /// Full scrollable content height of the widget document, in CSS pixels.
    WidgetResize { height: f64 },
    DonationComplete(DonationComplete),
}

/// Result of decoding an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(BridgeMessage),
    /// A well-formed object with a discriminant this version does not know.
    Unknown(String),
    /// Not an object, no `type`, or a known `type` with a bad payload.
    Malformed(String),
}

impl BridgeMessage {
    #[must_use]
    pub const fn resize(height: f64) -> Self {
        Self::WidgetResize { height }
    }

    /// Wire discriminant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WidgetResize { .. } => WIDGET_RESIZE,
            Self::DonationComplete(_) => DONATION_COMPLETE,
        }
    }

    /// Encode as a JSON value ready for `postMessage`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode an inbound payload. Never fails.
    #[must_use]
    pub fn decode(data: &Value) -> Decoded {
        let Some(kind) = data.get("type").and_then(Value::as_str) else {
            return Decoded::Malformed("missing string `type` field".into());
        };
        if kind != WIDGET_RESIZE && kind != DONATION_COMPLETE {
            return Decoded::Unknown(kind.to_owned());
        }
        match Self::deserialize(data) {
            Ok(message) => match message.validate() {
                Ok(()) => Decoded::Message(message),
                Err(reason) => Decoded::Malformed(reason),
            },
            Err(err) => Decoded::Malformed(err.to_string()),
        }
    }

    /// Decode a JSON string (some hosts stringify before posting).
    #[must_use]
    pub fn decode_str(raw: &str) -> Decoded {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::decode(&value),
            Err(err) => Decoded::Malformed(err.to_string()),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::WidgetResize { height } if !height.is_finite() || *height < 0.0 => {
                Err(format!("invalid height {height}"))
            }
            Self::DonationComplete(done) if done.donation_id.is_empty() => {
                Err("empty donationId".into())
            }
            Self::DonationComplete(done) if !done.amount.is_finite() => {
                Err(format!("invalid amount {}", done.amount))
            }
            _ => Ok(()),
        }
    }
}

/// `Date.prototype.toISOString` shape: millisecond precision, `Z` suffix.
fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
