#![forbid(unsafe_code)]

//! Origin handling for both ends of the bridge.
//!
//! The sender addresses a [`TargetOrigin`]; the receiver filters with an
//! [`OriginPolicy`]. Both default to explicit origins. The wildcard forms are
//! opt-in and logged when constructed.

use core::fmt;

use url::Url;

/// Normalize a URL or origin string to its ASCII origin serialization.
///
/// Parsing follows WHATWG URL rules: the host is lowercased (and IDNA
/// encoded), default ports are dropped and userinfo, path, query and
/// fragment are discarded. Relative input and URLs with an opaque origin
/// (`file:`, `data:`, the literal `"null"`) yield `None`.
///
/// ```
/// use embed_bridge::normalize_origin;
///
/// assert_eq!(
///     normalize_origin("HTTPS://Widget.Example:443/embed?amount=5").as_deref(),
///     Some("https://widget.example")
/// );
/// assert_eq!(normalize_origin("/embed"), None);
/// ```
#[must_use]
pub fn normalize_origin(raw: &str) -> Option<String> {
    let origin = Url::parse(raw.trim()).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Where the emitter addresses its messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Only a parent at this origin receives the message.
    Explicit(String),
    /// `"*"`: any parent receives the message.
    Wildcard,
}

impl TargetOrigin {
    /// Parse `"*"` or an origin/URL. Unparsable input yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim() == "*" {
            return Some(Self::Wildcard);
        }
        normalize_origin(raw).map(Self::Explicit)
    }

    /// Value for the `targetOrigin` argument of `postMessage`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Explicit(origin) => origin,
            Self::Wildcard => "*",
        }
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sender origins a listener accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Only these (normalized) origins.
    Exact(Vec<String>),
    /// Accept everything. Leaves the host open to spoofed messages.
    AnyOrigin,
}

impl OriginPolicy {
    /// Policy accepting exactly `origins`. Entries that do not parse are dropped.
    #[must_use]
    pub fn exact<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Exact(
            origins
                .into_iter()
                .filter_map(|o| normalize_origin(o.as_ref()))
                .collect(),
        )
    }

    /// Whether a message from `origin` may be acted upon.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::AnyOrigin => true,
            Self::Exact(allowed) => {
                normalize_origin(origin).is_some_and(|origin| allowed.iter().any(|a| *a == origin))
            }
        }
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::AnyOrigin)
    }
}
