//! Media type parsing and compatibility checks used by content negotiation.

use mime::Mime;

/// Returns `true` if two media types are compatible.
///
/// Wildcards match on either side: `*/*` is compatible with everything,
/// `text/*` with any `text` subtype, and `application/*+json` with any
/// `application` subtype carrying a `+json` suffix (or `application/json`
/// itself). Parameters such as `charset` are ignored.
///
/// # Examples
///
/// ```
/// use fnroute_http::media::is_compatible;
///
/// let json = mime::APPLICATION_JSON;
/// assert!(is_compatible(&json, &mime::STAR_STAR));
/// assert!(is_compatible(&json, &"application/*+json".parse().unwrap()));
/// assert!(!is_compatible(&json, &mime::TEXT_PLAIN));
/// ```
pub fn is_compatible(a: &Mime, b: &Mime) -> bool {
    if a.type_() == mime::STAR || b.type_() == mime::STAR {
        return true;
    }
    if a.type_() != b.type_() {
        return false;
    }
    let (a_subtype, b_subtype) = (full_subtype(a), full_subtype(b));
    a_subtype == b_subtype
        || wildcard_subtype_matches(a, b_subtype)
        || wildcard_subtype_matches(b, a_subtype)
}

/// The subtype including any `+suffix`, e.g. `vnd.api+json`.
fn full_subtype(media_type: &Mime) -> &str {
    media_type
        .essence_str()
        .split_once('/')
        .map_or("", |(_, subtype)| subtype)
}

// `*` matches any subtype; `*+json` matches `json` and any `...+json`.
fn wildcard_subtype_matches(pattern: &Mime, other_subtype: &str) -> bool {
    if pattern.subtype() != mime::STAR {
        return false;
    }
    pattern.suffix().map_or(true, |suffix| {
        other_subtype == suffix.as_str()
            || other_subtype
                .rsplit_once('+')
                .is_some_and(|(_, other)| other == suffix.as_str())
    })
}

/// Returns the `q` parameter of an `Accept` entry, defaulting to 1.
pub fn quality(media_type: &Mime) -> f32 {
    media_type
        .get_param("q")
        .and_then(|q| q.as_str().parse().ok())
        .unwrap_or(1.0)
}

/// Returns `true` if `media_type` is acceptable under a parsed `Accept` list.
///
/// An empty list accepts everything. Entries with `q=0` are never used to
/// accept, and a concrete `q=0` entry refuses the type it names even when a
/// wildcard elsewhere in the list would accept it.
///
/// ```
/// use fnroute_http::media::{is_acceptable, parse_media_types};
///
/// let accept = parse_media_types(["application/json;q=0, text/html"]);
/// assert!(!is_acceptable(&mime::APPLICATION_JSON, &accept));
/// assert!(is_acceptable(&mime::TEXT_HTML, &accept));
/// ```
pub fn is_acceptable(media_type: &Mime, accepted: &[Mime]) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let refused = accepted.iter().any(|candidate| {
        quality(candidate) <= 0.0
            && candidate.type_() != mime::STAR
            && candidate.subtype() != mime::STAR
            && is_compatible(media_type, candidate)
    });
    !refused
        && accepted
            .iter()
            .any(|candidate| quality(candidate) > 0.0 && is_compatible(media_type, candidate))
}

/// Parses comma-separated media type lists from one or more header values.
///
/// Entries that fail to parse are skipped; order is preserved.
pub fn parse_media_types<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Mime> {
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.parse().ok())
        .collect()
}
