//! Header handling shared by the forwarding and upgrade paths.

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::Uri;

/// Hop-by-hop headers that never travel past this proxy on buffered
/// exchanges.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Host value supplied when a client sent none.
const FALLBACK_HOST: &str = "localhost";

/// Returns true when any `Connection` header value contains `upgrade`,
/// compared case-insensitively.
#[must_use]
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("upgrade"))
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Inserts a `Host` header when the request carries none.
pub(crate) fn ensure_host(headers: &mut HeaderMap) {
    if !headers.contains_key(header::HOST) {
        headers.insert(header::HOST, HeaderValue::from_static(FALLBACK_HOST));
    }
}

/// Returns the origin-form target (path and query) of `uri`.
pub(crate) fn origin_form(uri: &Uri) -> Uri {
    uri.path_and_query()
        .cloned()
        .map_or_else(|| Uri::from_static("/"), Uri::from)
}
