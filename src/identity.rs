//! Canonical link identity used for deduplication.

use crate::config::FINGERPRINT_MAX_CHARS;

/// Derive the dedup fingerprint of a link: the identity segment between
/// `://` and the first following `@`, the remainder after `://` when no
/// `@` exists, or the whole link when no scheme marker exists; truncated
/// to 50 characters. Pure and total.
///
/// Known sharp edge: two links sharing an identity segment but differing in
/// host/port/query collapse to one fingerprint, so only the most recently
/// processed one's metadata survives an upsert. Consumers that need
/// host+port to participate in identity must derive their own key.
pub fn fingerprint(link: &str) -> String {
    let after_scheme = match link.split_once("://") {
        Some((_, rest)) => rest,
        None => link,
    };
    let identity = match after_scheme.split_once('@') {
        Some((user_info, _)) => user_info,
        None => after_scheme,
    };
    identity.chars().take(FINGERPRINT_MAX_CHARS).collect()
}

/// Link with its query string (and anything after it) removed; the key the
/// extractor collapses same-run candidates on, since overlapping grammars
/// can match the identical URI.
pub fn strip_query(link: &str) -> &str {
    match link.split_once('?') {
        Some((base, _)) => base,
        None => link,
    }
}
