//! # Content Negotiation
//!
//! Parsing of `Content-Type` and `Accept`, and the selection rules built on them.
//!
//! ## Content-Type
//!
//! [`parse_content_type`] returns the lower-cased media type and the optional
//! charset. A missing or empty header means [`DEFAULT_MIME`]. A header that does not
//! follow the RFC 2045 token grammar yields [`ApiError::Parse`] carrying the header
//! name, the raw value and the parser's reason.
//!
//! ## Accept
//!
//! [`negotiate_content_type`] ranks each offer against the parsed `Accept` entries:
//!
//! - entries with `q=0` never match
//! - a higher `q` beats a lower one
//! - at equal `q`, an exact match beats `type/*`, which beats `*/*`
//! - on a full tie the earlier offer wins
//!
//! Without an `Accept` header (or with an empty one) the first offer wins. If nothing
//! matches the caller-supplied default is returned, which may be empty to signal 406.

use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderMap;

use crate::codec::{DEFAULT_MIME, WILDCARD_MIME};
use crate::errors::ApiError;

/// A parsed `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lower-cased `type/subtype`.
    pub essence: String,
    pub charset: Option<String>,
}

/// Parse a raw media type string.
///
/// # Errors
///
/// Returns the parser's reason when the value is not a valid media type.
pub fn parse_media_type(raw: &str) -> Result<MediaType, String> {
    let parsed: mime::Mime = raw.trim().parse().map_err(|e: mime::FromStrError| e.to_string())?;
    let charset = parsed
        .get_param(mime::CHARSET)
        .map(|v| v.as_str().to_string());
    Ok(MediaType {
        essence: parsed.essence_str().to_ascii_lowercase(),
        charset,
    })
}

/// Read and parse the request `Content-Type`.
///
/// # Errors
///
/// [`ApiError::Parse`] (400) when the header is present but malformed.
pub fn parse_content_type(headers: &HeaderMap) -> Result<MediaType, ApiError> {
    let raw = match headers.get(CONTENT_TYPE) {
        Some(value) => value.to_str().map_err(|e| ApiError::Parse {
            name: CONTENT_TYPE.as_str().to_string(),
            location: "header".to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            reason: e.to_string(),
        })?,
        None => "",
    };
    content_type_from_str(raw)
}

/// Same as [`parse_content_type`] on an already extracted header value.
pub fn content_type_from_str(raw: &str) -> Result<MediaType, ApiError> {
    let effective = if raw.trim().is_empty() { DEFAULT_MIME } else { raw };
    parse_media_type(effective).map_err(|reason| ApiError::Parse {
        name: CONTENT_TYPE.as_str().to_string(),
        location: "header".to_string(),
        value: raw.to_string(),
        reason,
    })
}

/// Check a request media type against an operation's `consumes`.
///
/// An empty list accepts everything. Otherwise the media type must appear in the list
/// (case-insensitive, parameters ignored), or the list must contain `*/*` or the
/// matching `type/*`.
///
/// # Errors
///
/// [`ApiError::UnsupportedMediaType`] (415).
pub fn validate_content_type(allowed: &[String], actual: &str) -> Result<(), ApiError> {
    if allowed.is_empty() {
        return Ok(());
    }
    let unsupported = || ApiError::UnsupportedMediaType {
        media_type: actual.to_string(),
        allowed: allowed.to_vec(),
    };
    let media = parse_media_type(actual).map_err(|_| unsupported())?;

    let normalized: Vec<String> = allowed.iter().map(|a| normalize_offer(a)).collect();
    if normalized.iter().any(|a| *a == media.essence || a == WILDCARD_MIME) {
        return Ok(());
    }
    if let Some((main, _)) = media.essence.split_once('/') {
        let family = format!("{main}/*");
        if normalized.contains(&family) {
            return Ok(());
        }
    }
    Err(unsupported())
}

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptSpec {
    pub value: String,
    pub q: f32,
}

/// Parse an `Accept` header value; unparseable entries are dropped.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<AcceptSpec> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let value = parts.next()?.trim().to_ascii_lowercase();
            if value.is_empty() || !value.contains('/') {
                return None;
            }
            let mut q = 1.0_f32;
            for param in parts {
                if let Some((name, raw)) = param.split_once('=') {
                    if name.trim().eq_ignore_ascii_case("q") {
                        q = raw.trim().parse().ok()?;
                    }
                }
            }
            Some(AcceptSpec {
                value,
                q: q.clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Strip parameters and lower-case an offered media type.
fn normalize_offer(offer: &str) -> String {
    offer
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the best offer for an `Accept` header.
///
/// Returns `default_offer` when nothing matches; see the module docs for ranking.
#[must_use]
pub fn negotiate_content_type(
    accept: Option<&str>,
    offers: &[String],
    default_offer: &str,
) -> String {
    let specs = accept.map(parse_accept).unwrap_or_default();
    if specs.is_empty() {
        return offers
            .first()
            .cloned()
            .unwrap_or_else(|| default_offer.to_string());
    }

    let mut best_offer = default_offer.to_string();
    let mut best_q = -1.0_f32;
    // 0 exact, 1 type/*, 2 */*, 3 nothing yet
    let mut best_wild = 3_u8;

    for raw_offer in offers {
        let offer = normalize_offer(raw_offer);
        for spec in &specs {
            if spec.q == 0.0 || spec.q < best_q {
                continue;
            }
            let wild = if spec.value == WILDCARD_MIME {
                2
            } else if let Some(prefix) = spec.value.strip_suffix('*') {
                if !offer.starts_with(prefix) {
                    continue;
                }
                1
            } else if spec.value == offer {
                0
            } else {
                continue;
            };
            if spec.q > best_q || best_wild > wild {
                best_q = spec.q;
                best_wild = wild;
                best_offer = raw_offer.clone();
            }
        }
    }
    best_offer
}

/// [`negotiate_content_type`] on a request's headers.
#[must_use]
pub fn negotiate_from_headers(headers: &HeaderMap, offers: &[String], default_offer: &str) -> String {
    let accept = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    let accept = if accept.trim().is_empty() {
        None
    } else {
        Some(accept.as_str())
    };
    negotiate_content_type(accept, offers, default_offer)
}
