//! Link extraction from raw archive text.
//!
//! Each protocol grammar is scanned for non-overlapping matches; a window of
//! surrounding text supplies the ping/location/host heuristics. One bad match
//! never aborts the rest of the scan.

use crate::config::{CONTEXT_RADIUS, LOCATION_FLAGS, UNKNOWN_LOCATION};
use crate::identity::{fingerprint, strip_query};
use crate::record::{ConfigRecord, Protocol, QualityTier};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static VLESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)vless://([a-zA-Z0-9\-]+)@([^:\s]+):(\d+)(?:\?([^#\s]*))?(?:#([^\s]*))?")
        .unwrap()
});
static VMESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)vmess://([A-Za-z0-9+/=]+)").unwrap());
static TROJAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)trojan://([a-zA-Z0-9\-]+)@([^:\s]+):(\d+)(?:\?([^#\s]*))?(?:#([^\s]*))?")
        .unwrap()
});
static SS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ss://([A-Za-z0-9+/=]+)@([^:\s]+):(\d+)(?:#([^\s]*))?").unwrap()
});
static MTPROTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)mtproto://([A-Za-z0-9+/=]+)").unwrap());

/// Ping label variants, tried in order.
static PING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"📶\s*پینگ[:\s]*(\d+)\s*ms").unwrap(),
        Regex::new(r"پینگ[:\s]*(\d+)\s*ms").unwrap(),
        Regex::new(r"(?i)ping[:\s]*(\d+)\s*ms").unwrap(),
        Regex::new(r"(?i)(\d+)\s*ms").unwrap(),
    ]
});

/// `server: example.com`-style hint near a link that carries no host itself.
static HOST_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:server|host|address)[:\s]+([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").unwrap()
});

fn grammars() -> [(Protocol, &'static Regex); 5] {
    [
        (Protocol::Vless, &VLESS_RE),
        (Protocol::Vmess, &VMESS_RE),
        (Protocol::Trojan, &TROJAN_RE),
        (Protocol::Shadowsocks, &SS_RE),
        (Protocol::Mtproto, &MTPROTO_RE),
    ]
}

/// Stateless extractor carrying only the branding remark written into every
/// rewritten link.
pub struct LinkExtractor {
    branding_remark: String,
}

impl LinkExtractor {
    pub fn new(branding_remark: impl Into<String>) -> Self {
        LinkExtractor {
            branding_remark: branding_remark.into(),
        }
    }

    /// Scan `text` for every recognized link and return candidate records,
    /// collapsed on the query-stripped link.
    pub fn extract(&self, text: &str) -> Vec<ConfigRecord> {
        let mut candidates = Vec::new();
        for (protocol, pattern) in grammars() {
            for caps in pattern.captures_iter(text) {
                match self.parse_match(&caps, protocol, text) {
                    Ok(record) => candidates.push(record),
                    Err(e) => {
                        log::warn!("skipping {} match: {e}", protocol.as_str());
                    }
                }
            }
        }
        collapse_candidates(candidates)
    }

    fn parse_match(
        &self,
        caps: &regex::Captures<'_>,
        protocol: Protocol,
        text: &str,
    ) -> Result<ConfigRecord> {
        let whole = caps.get(0).ok_or_else(|| anyhow!("empty match"))?;
        let raw_link = whole.as_str();
        let window = context_window(text, whole.start(), whole.end());

        let ping = extract_ping(window);
        let location = extract_location(window);
        let original_remark = extract_original_remark(raw_link, protocol);
        let link = rewrite_remark(raw_link, &self.branding_remark);

        let (server, port) = match protocol {
            Protocol::Vless | Protocol::Trojan | Protocol::Shadowsocks => {
                let server = caps
                    .get(2)
                    .ok_or_else(|| anyhow!("missing host capture"))?
                    .as_str()
                    .to_string();
                let port = caps
                    .get(3)
                    .map(|m| m.as_str().parse::<u16>().unwrap_or(0))
                    .unwrap_or(0);
                (server, port)
            }
            Protocol::Vmess | Protocol::Mtproto => {
                let server = find_host_hint(window).unwrap_or_else(|| "unknown".to_string());
                (server, 0)
            }
        };

        let quality = QualityTier::from_ping(&ping);
        Ok(ConfigRecord {
            fingerprint: fingerprint(&link),
            protocol,
            link,
            original_link: raw_link.to_string(),
            original_remark: original_remark.clone(),
            server,
            port,
            location,
            ping,
            quality,
            source: original_remark,
            delivery: None,
            bad_reports: 0,
            copy_count: 0,
            created_at: Utc::now(),
        })
    }
}

/// Slice ±CONTEXT_RADIUS characters around a match, clamped to the nearest
/// char boundaries so multi-byte text cannot panic the scan.
fn context_window(text: &str, start: usize, end: usize) -> &str {
    let lo = floor_boundary(text, start.saturating_sub(CONTEXT_RADIUS));
    let hi = ceil_boundary(text, (end + CONTEXT_RADIUS).min(text.len()));
    &text[lo..hi]
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// First ping label variant that matches wins; `"---"` when none do.
pub fn extract_ping(window: &str) -> String {
    for pattern in PING_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(window) {
            return format!("{}ms", &caps[1]);
        }
    }
    "---".to_string()
}

/// First location table entry contained in the window wins; table order is
/// the priority order.
pub fn extract_location(window: &str) -> String {
    for (needle, flag, name) in LOCATION_FLAGS {
        if window.contains(needle) {
            return format!("{flag} {name}");
        }
    }
    UNKNOWN_LOCATION.to_string()
}

fn find_host_hint(window: &str) -> Option<String> {
    HOST_HINT_RE
        .captures(window)
        .map(|caps| caps[1].to_string())
}

/// The remark a link carried before rewriting: the fragment when present,
/// else (for VMess) the `ps` name inside the base64 payload, else
/// `"Unknown"`. Never fails past the single match.
pub fn extract_original_remark(link: &str, protocol: Protocol) -> String {
    if let Some((_, remark)) = link.rsplit_once('#') {
        return remark.to_string();
    }
    if protocol == Protocol::Vmess {
        if let Some(name) = vmess_payload_name(link) {
            return name;
        }
    }
    "Unknown".to_string()
}

/// Decode the opaque VMess payload (re-padded to a multiple of 4) as JSON
/// and read its `ps` name field.
fn vmess_payload_name(link: &str) -> Option<String> {
    let payload = link.split_once("://").map(|(_, rest)| rest)?;
    let mut b64 = payload.to_string();
    let rem = b64.len() % 4;
    if rem != 0 {
        b64.push_str(&"=".repeat(4 - rem));
    }
    let bytes = BASE64.decode(b64).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("ps").and_then(|v| v.as_str()).map(String::from)
}

/// Replace the fragment with the branding remark, appending one when the
/// link carries none. Everything before the fragment is untouched.
pub fn rewrite_remark(link: &str, remark: &str) -> String {
    let base = match link.split_once('#') {
        Some((base, _)) => base,
        None => link,
    };
    format!("{base}#{remark}")
}

/// Overlapping grammars can emit the identical URI twice; keep the first
/// candidate per query-stripped link.
fn collapse_candidates(candidates: Vec<ConfigRecord>) -> Vec<ConfigRecord> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(strip_query(&c.link).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_label_variants_all_parse() {
        assert_eq!(extract_ping("📶 پینگ: 45 ms"), "45ms");
        assert_eq!(extract_ping("پینگ: 62ms"), "62ms");
        assert_eq!(extract_ping("Ping: 120 ms"), "120ms");
        assert_eq!(extract_ping("latency 88ms today"), "88ms");
        assert_eq!(extract_ping("no ping here"), "---");
    }

    #[test]
    fn location_table_order_is_priority() {
        // The localized needle wins over the bare code even when both occur.
        assert_eq!(extract_location("سرور آلمان DE"), "🇩🇪 Germany");
        // "Korea" is matched before the trailing code entries.
        assert_eq!(extract_location("South Korea node"), "🇰🇷 South Korea");
        assert_eq!(extract_location("nothing here"), UNKNOWN_LOCATION);
    }

    #[test]
    fn rewrite_replaces_or_appends_fragment() {
        assert_eq!(
            rewrite_remark("vless://u@h:1#old", "Brand"),
            "vless://u@h:1#Brand"
        );
        assert_eq!(rewrite_remark("vless://u@h:1", "Brand"), "vless://u@h:1#Brand");
    }
}
