#![forbid(unsafe_code)]

//! Server-side semantics of `GET /impact?amount=&type=`.
//!
//! [`ImpactEndpoint::handle`] is a pure function from a query string to a
//! status code and JSON body, so any HTTP stack (or the CLI) can serve it.

use serde_json::{Value, json};

use crate::amount::{Amount, Cadence};
use crate::query;
use crate::resolver::ImpactResolver;

/// Default upper bound accepted by the endpoint.
pub const DEFAULT_MAX_AMOUNT: f64 = 10_000.0;

const MISSING_AMOUNT: &str = "Amount parameter is required";
const INVALID_AMOUNT: &str = "Invalid amount. Must be a positive number.";
const INVALID_TYPE: &str = "Invalid type. Must be one-time or monthly.";

/// HTTP status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointReply {
    pub status: u16,
    pub body: Value,
}

impl EndpointReply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            body: json!({ "error": message.into() }),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Stateless request handler over a resolver.
#[derive(Debug, Clone)]
pub struct ImpactEndpoint {
    resolver: ImpactResolver,
    max_amount: f64,
}

impl ImpactEndpoint {
    #[must_use]
    pub fn new(resolver: ImpactResolver) -> Self {
        Self {
            resolver,
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }

    #[must_use]
    pub fn with_max_amount(mut self, max_amount: f64) -> Self {
        self.max_amount = max_amount;
        self
    }

    #[must_use]
    pub const fn max_amount(&self) -> f64 {
        self.max_amount
    }

    /// Answer one query string (with or without the leading `?`).
    #[must_use]
    pub fn handle(&self, query: &str) -> EndpointReply {
        let Some(raw_amount) = query::first(query, "amount").filter(|v| !v.is_empty()) else {
            return EndpointReply::bad_request(MISSING_AMOUNT);
        };
        let Some(amount) = raw_amount
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| Amount::new(v).ok())
        else {
            return EndpointReply::bad_request(INVALID_AMOUNT);
        };
        if amount.get() > self.max_amount {
            return EndpointReply::bad_request(format!(
                "Amount exceeds maximum. For donations over £{}, please contact us directly.",
                group_thousands(self.max_amount)
            ));
        }
        let cadence = match query::first(query, "type").as_deref() {
            None | Some("") => Cadence::OneTime,
            Some(raw) => match raw.parse::<Cadence>() {
                Ok(cadence) => cadence,
                Err(_) => return EndpointReply::bad_request(INVALID_TYPE),
            },
        };

        let statement = self.resolver.resolve(amount, cadence).text;
        let reply = match self.resolver.catalog().lookup(amount) {
            Some(range) => EndpointReply::ok(json!({
                "statement": statement,
                "range": { "min": range.min_amount, "max": range.max_amount },
                "donationType": cadence.as_str(),
                "amount": amount.get(),
                "configId": range.id,
            })),
            None => EndpointReply::ok(json!({
                "statement": statement,
                "range": { "min": amount.get(), "max": amount.get() },
                "donationType": cadence.as_str(),
                "amount": amount.get(),
                "isCustom": true,
            })),
        };
        tracing::debug!(
            target: "embed.resolver",
            amount = amount.get(),
            cadence = %cadence,
            "impact query answered"
        );
        reply
    }
}

/// `10000` -> `10,000`. Fractional limits are printed as-is.
fn group_thousands(value: f64) -> String {
    if value.fract() != 0.0 || value.abs() >= 1e15 {
        return value.to_string();
    }
    let digits = format!("{}", value.abs() as u64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StatementCatalog;
    use pretty_assertions::assert_eq;

    fn endpoint() -> ImpactEndpoint {
        ImpactEndpoint::new(ImpactResolver::new(StatementCatalog::builtin()))
    }

    #[test]
    fn rejects_missing_and_invalid_amounts() {
        let ep = endpoint();
        assert_eq!(
            ep.handle("type=one-time"),
            EndpointReply::bad_request(MISSING_AMOUNT)
        );
        assert_eq!(ep.handle("amount="), EndpointReply::bad_request(MISSING_AMOUNT));
        for bad in ["amount=abc", "amount=0", "amount=-5", "amount=NaN", "amount=inf"] {
            assert_eq!(ep.handle(bad), EndpointReply::bad_request(INVALID_AMOUNT), "{bad}");
        }
    }

    #[test]
    fn rejects_amounts_over_the_limit() {
        let reply = endpoint().handle("amount=10001");
        assert_eq!(reply.status, 400);
        assert_eq!(
            reply.body["error"],
            "Amount exceeds maximum. For donations over £10,000, please contact us directly."
        );
        assert!(endpoint().handle("amount=10000").is_success());
    }

    #[test]
    fn rejects_unknown_type() {
        let reply = endpoint().handle("amount=40&type=weekly");
        assert_eq!(reply, EndpointReply::bad_request(INVALID_TYPE));
    }

    #[test]
    fn catalog_hit_carries_range_and_config_id() {
        let reply = endpoint().handle("?amount=40");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["configId"], 5);
        assert_eq!(reply.body["range"], json!({ "min": 40.0, "max": 49.0 }));
        assert_eq!(reply.body["donationType"], "one-time");
        assert_eq!(reply.body["amount"], 40.0);
        assert!(reply.body.get("isCustom").is_none());
    }

    #[test]
    fn monthly_hit_uses_monthly_text() {
        let reply = endpoint().handle("amount=25&type=monthly");
        assert_eq!(reply.body["donationType"], "monthly");
        let text = reply.body["statement"].as_str().unwrap();
        assert!(text.contains("£25 a month (£300 a year)"));
    }

    #[test]
    fn gap_is_answered_as_custom() {
        let reply = endpoint().handle("amount=14.5");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["isCustom"], true);
        assert_eq!(reply.body["range"], json!({ "min": 14.5, "max": 14.5 }));
        assert!(
            reply.body["statement"]
                .as_str()
                .unwrap()
                .starts_with("£14.5 will make a real difference")
        );
    }

    #[test]
    fn custom_limit_is_respected() {
        let ep = endpoint().with_max_amount(500.0);
        assert_eq!(ep.handle("amount=600").status, 400);
        assert!(ep.handle("amount=600").body["error"].as_str().unwrap().contains("£500"));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(10_000.0), "10,000");
        assert_eq!(group_thousands(999.0), "999");
        assert_eq!(group_thousands(1_234_567.0), "1,234,567");
        assert_eq!(group_thousands(12.5), "12.5");
    }
}
