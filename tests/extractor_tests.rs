//! tests/extractor_tests.rs
//!
//! Pure extraction tests: protocol grammars, context heuristics, remark
//! rewriting and the in-run candidate collapse. No Redis or network needed.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use config_courier_bot::extractor::LinkExtractor;
use config_courier_bot::identity::fingerprint;
use config_courier_bot::record::{Protocol, QualityTier};

const REMARK: &str = "Courier | @courierconfigs";

fn extractor() -> LinkExtractor {
    LinkExtractor::new(REMARK)
}

#[test]
fn extracts_one_record_per_protocol_occurrence() {
    let vmess_payload = STANDARD.encode(r#"{"ps":"Frankfurt-1","add":"de.example.com"}"#);
    let text = format!(
        "vless://abc-123@1.2.3.4:443?type=ws#Old ping: 42 ms Germany\n\
         vmess://{vmess_payload}\n\
         trojan://tr-9@5.6.7.8:8443#TrojanNode\n\
         ss://YWVzLTI1Ni1nY206cGFzcw==@9.9.9.9:8388#SsNode\n\
         mtproto://c2VjcmV0cGF5bG9hZA=="
    );
    let records = extractor().extract(&text);
    assert_eq!(records.len(), 5);

    let protocols: Vec<&str> = records.iter().map(|r| r.protocol.as_str()).collect();
    assert_eq!(
        protocols,
        vec!["VLESS", "VMESS", "TROJAN", "SHADOWSOCKS", "MTPROTO"]
    );
    for record in &records {
        assert!(
            record.link.ends_with(&format!("#{REMARK}")),
            "link not rebranded: {}",
            record.link
        );
        assert!(record.is_pending());
    }
}

#[test]
fn vless_fields_come_from_the_grammar_and_the_window() {
    let text = "سرور آلمان 📶 پینگ: 42 ms\nvless://abc-123@1.2.3.4:443?type=ws#OldName";
    let records = extractor().extract(text);
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.protocol, Protocol::Vless);
    assert_eq!(r.server, "1.2.3.4");
    assert_eq!(r.port, 443);
    assert_eq!(r.ping, "42ms");
    assert_eq!(r.quality, QualityTier::Green);
    assert_eq!(r.location, "🇩🇪 Germany");
    assert_eq!(r.original_remark, "OldName");
    assert_eq!(r.original_link, "vless://abc-123@1.2.3.4:443?type=ws#OldName");
    assert_eq!(r.fingerprint, "abc-123");
    assert_eq!(r.source, "OldName");
}

#[test]
fn quality_tier_boundaries() {
    assert_eq!(QualityTier::from_ping("50ms"), QualityTier::Green);
    assert_eq!(QualityTier::from_ping("51ms"), QualityTier::Yellow);
    assert_eq!(QualityTier::from_ping("150ms"), QualityTier::Yellow);
    assert_eq!(QualityTier::from_ping("151ms"), QualityTier::Red);
    assert_eq!(QualityTier::from_ping("---"), QualityTier::Unknown);
    assert_eq!(QualityTier::from_ping(""), QualityTier::Unknown);
}

#[test]
fn vmess_remark_decodes_the_payload_name() {
    // Padding stripped on purpose: the extractor must re-pad before decoding.
    let payload = STANDARD
        .encode(r#"{"ps":"Tokyo Node","add":"jp.example.com","port":"443"}"#)
        .trim_end_matches('=')
        .to_string();
    let text = format!("vmess://{payload}");
    let records = extractor().extract(&text);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original_remark, "Tokyo Node");
}

#[test]
fn vmess_garbage_payload_falls_back_to_unknown() {
    let records = extractor().extract("vmess://bm90anNvbg==");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original_remark, "Unknown");
    assert_eq!(records[0].server, "unknown");
    assert_eq!(records[0].port, 0);
}

#[test]
fn vmess_server_can_come_from_a_window_hint() {
    let text = "server: relay.example.com\nvmess://bm90anNvbg==";
    let records = extractor().extract(text);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].server, "relay.example.com");
}

#[test]
fn missing_ping_means_unknown_quality() {
    let records = extractor().extract("vless://u-1@h.example.com:443#x");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ping, "---");
    assert_eq!(records[0].quality, QualityTier::Unknown);
}

#[test]
fn repeated_link_collapses_to_one_candidate() {
    let text = "vless://dup-1@1.2.3.4:443#a\nsome text\nvless://dup-1@1.2.3.4:443#a";
    let records = extractor().extract(text);
    assert_eq!(records.len(), 1);
}

#[test]
fn identical_identity_segment_yields_identical_fingerprint() {
    let a = extractor().extract("vless://abc-123@1.2.3.4:443#A");
    let b = extractor().extract("vless://abc-123@5.6.7.8:9999#B");
    assert_eq!(a[0].fingerprint, "abc-123");
    assert_eq!(a[0].fingerprint, b[0].fingerprint);
}

#[test]
fn fingerprint_is_total_over_arbitrary_input() {
    // Never panics, whatever the shape.
    for link in ["", "://", "a@b", "vless://", "vless://@host", "🏳️"] {
        let _ = fingerprint(link);
    }
}

#[test]
fn multibyte_text_around_a_link_does_not_break_the_window() {
    let text = format!(
        "{}vless://pad-1@1.2.3.4:443#x{}",
        "پینگ و لوکیشن ".repeat(60),
        " متن فارسی".repeat(60)
    );
    let records = extractor().extract(&text);
    assert_eq!(records.len(), 1);
}
