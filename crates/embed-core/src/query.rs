#![forbid(unsafe_code)]

//! Query-string helpers for the `GET /impact` lookup and the embed URL.
//!
//! Parsing and serialization go through the `url` crate so that both follow
//! WHATWG URL rules. Relative references (`/api/impact`, `embed?x=1`) are
//! resolved against a placeholder origin and stay relative on output.

use url::{ParseError, Position, Url, form_urlencoded};

/// Origin used to resolve relative references. Never appears in output.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// First value for `key` in a form-encoded query (leading `?` optional).
#[must_use]
pub fn first(query: &str, key: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Parse an absolute URL, or resolve a relative one against a placeholder.
///
/// The flag is `true` when `raw` was relative.
pub fn parse_reference(raw: &str) -> Result<(Url, bool), ParseError> {
    match Url::parse(raw) {
        Ok(url) => Ok((url, false)),
        Err(ParseError::RelativeUrlWithoutBase) => {
            Ok((Url::parse(RELATIVE_BASE)?.join(raw)?, true))
        }
        Err(err) => Err(err),
    }
}

/// Query component of `raw` (absolute or relative), without the `?`.
pub fn query_of(raw: &str) -> Result<String, ParseError> {
    let (url, _) = parse_reference(raw)?;
    Ok(url.query().unwrap_or_default().to_owned())
}

/// Append `pairs` to the query of `base`, ahead of any fragment.
///
/// An existing query is kept. With no pairs `base` comes back unchanged.
pub fn append_pairs<'a, I>(base: &str, pairs: I) -> Result<String, ParseError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs = pairs.into_iter().peekable();
    if pairs.peek().is_none() {
        return Ok(base.to_owned());
    }
    let (mut url, relative) = parse_reference(base)?;
    url.query_pairs_mut().extend_pairs(pairs);
    if !relative {
        return Ok(url.into());
    }
    let trimmed = base.trim_start();
    Ok(if trimmed.starts_with("//") {
        format!("//{}", &url[Position::BeforeUsername..])
    } else if trimmed.starts_with('/') {
        url[Position::BeforePath..].to_owned()
    } else {
        url[Position::BeforePath..].trim_start_matches('/').to_owned()
    })
}
