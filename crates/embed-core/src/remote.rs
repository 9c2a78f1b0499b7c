#![forbid(unsafe_code)]

//! Wire types for the remote `GET /impact` statement service.
//!
//! The transport itself belongs to the host (browser `fetch`, a blocking
//! HTTP client in the CLI). This module only builds the query and interprets
//! `(status, body)` pairs, so every host classifies failures the same way.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

use crate::amount::{Amount, Cadence};
use crate::query;

/// One `GET /impact` lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactQuery {
    pub amount: Amount,
    pub cadence: Cadence,
}

impl ImpactQuery {
    #[must_use]
    pub const fn new(amount: Amount, cadence: Cadence) -> Self {
        Self { amount, cadence }
    }

    /// `amount=<n>&type=<cadence>`.
    #[must_use]
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("amount", &self.amount.to_string())
            .append_pair("type", self.cadence.as_str())
            .finish()
    }

    /// Append the query to `endpoint`, keeping any query or fragment it
    /// already has. Relative endpoints stay relative.
    pub fn url(&self, endpoint: &str) -> Result<String, RemoteFailure> {
        let amount = self.amount.to_string();
        let pairs = [("amount", amount.as_str()), ("type", self.cadence.as_str())];
        query::append_pairs(endpoint, pairs).map_err(|err| RemoteFailure::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: err.to_string(),
        })
    }
}

/// Inclusive bounds of the range that produced a statement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseRange {
    pub min: f64,
    pub max: f64,
}

/// Successful (`200`) endpoint body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResponse {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ResponseRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<u32>,
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub is_custom: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Why a remote lookup could not be used. Always downgraded to fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    #[error("statement service returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status { status: u16, message: Option<String> },

    #[error("invalid statement endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode statement response: {0}")]
    Decode(String),

    #[error("statement service returned an empty statement")]
    EmptyStatement,

    #[error("statement service did not answer in time")]
    TimedOut,
}

/// Classify a raw HTTP response.
pub fn parse_response(status: u16, body: &str) -> Result<ImpactResponse, RemoteFailure> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|b| b.error);
        return Err(RemoteFailure::Status { status, message });
    }
    let response: ImpactResponse =
        serde_json::from_str(body).map_err(|e| RemoteFailure::Decode(e.to_string()))?;
    if response.statement.trim().is_empty() {
        return Err(RemoteFailure::EmptyStatement);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_url_building() {
        let q = ImpactQuery::new(Amount::new(40.0).unwrap(), Cadence::OneTime);
        assert_eq!(q.query_string(), "amount=40&type=one-time");
        assert_eq!(q.url("/impact").unwrap(), "/impact?amount=40&type=one-time");
        assert_eq!(
            q.url("https://api.example/impact?v=2").unwrap(),
            "https://api.example/impact?v=2&amount=40&type=one-time"
        );
    }

    #[test]
    fn query_url_lands_before_fragment() {
        let q = ImpactQuery::new(Amount::new(40.0).unwrap(), Cadence::OneTime);
        assert_eq!(q.url("/api/impact#x").unwrap(), "/api/impact?amount=40&type=one-time#x");
        assert_eq!(
            q.url("https://api.example/impact#top").unwrap(),
            "https://api.example/impact?amount=40&type=one-time#top"
        );
    }

    #[test]
    fn malformed_endpoint_is_a_failure() {
        let q = ImpactQuery::new(Amount::new(40.0).unwrap(), Cadence::OneTime);
        assert!(matches!(
            q.url("https://"),
            Err(RemoteFailure::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn parses_success_body() {
        let body = r#"{"statement":"£40 helps","range":{"min":40,"max":49},"donationType":"one-time","amount":40,"configId":5}"#;
        let resp = parse_response(200, body).unwrap();
        assert_eq!(resp.config_id, Some(5));
        assert_eq!(resp.range, Some(ResponseRange { min: 40.0, max: 49.0 }));
        assert!(!resp.is_custom);
    }

    #[test]
    fn classifies_failures() {
        assert_eq!(
            parse_response(400, r#"{"error":"Invalid amount"}"#),
            Err(RemoteFailure::Status {
                status: 400,
                message: Some("Invalid amount".into())
            })
        );
        assert_eq!(
            parse_response(500, "oops"),
            Err(RemoteFailure::Status {
                status: 500,
                message: None
            })
        );
        assert!(matches!(
            parse_response(200, "not json"),
            Err(RemoteFailure::Decode(_))
        ));
        assert_eq!(
            parse_response(200, r#"{"statement":"  "}"#),
            Err(RemoteFailure::EmptyStatement)
        );
    }

    #[test]
    fn status_failure_display() {
        let err = RemoteFailure::Status {
            status: 500,
            message: Some("boom".into()),
        };
        assert_eq!(err.to_string(), "statement service returned 500: boom");
    }
}
