//! The config record and its Redis hash representation.

use crate::config::field;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Proxy protocols the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
    Mtproto,
}

impl Protocol {
    /// Uppercased tag used in storage, hashtags and post texts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "VLESS",
            Protocol::Vmess => "VMESS",
            Protocol::Trojan => "TROJAN",
            Protocol::Shadowsocks => "SHADOWSOCKS",
            Protocol::Mtproto => "MTPROTO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "VLESS" => Some(Protocol::Vless),
            "VMESS" => Some(Protocol::Vmess),
            "TROJAN" => Some(Protocol::Trojan),
            "SHADOWSOCKS" => Some(Protocol::Shadowsocks),
            "MTPROTO" => Some(Protocol::Mtproto),
            _ => None,
        }
    }
}

/// Coarse quality bucket derived from a scraped ping value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Green,
    Yellow,
    Red,
    Unknown,
}

impl QualityTier {
    /// `<=50ms` green, `<=150ms` yellow, above that red; anything that does
    /// not parse as `"<digits>ms"` is unknown.
    pub fn from_ping(ping: &str) -> Self {
        match ping.trim().trim_end_matches("ms").trim().parse::<u32>() {
            Ok(n) if n <= 50 => QualityTier::Green,
            Ok(n) if n <= 150 => QualityTier::Yellow,
            Ok(_) => QualityTier::Red,
            Err(_) => QualityTier::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Green => "GREEN",
            QualityTier::Yellow => "YELLOW",
            QualityTier::Red => "RED",
            QualityTier::Unknown => "UNKNOWN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GREEN" => Some(QualityTier::Green),
            "YELLOW" => Some(QualityTier::Yellow),
            "RED" => Some(QualityTier::Red),
            "UNKNOWN" => Some(QualityTier::Unknown),
            _ => None,
        }
    }

    /// Glyph shown next to the ping in channel posts.
    pub fn glyph(&self) -> &'static str {
        match self {
            QualityTier::Green => "🟢",
            QualityTier::Yellow => "🟡",
            QualityTier::Red => "🔴",
            QualityTier::Unknown => "⚪️",
        }
    }
}

/// Where and when a record was delivered. Absence of the mark is what makes
/// a record pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMark {
    pub channel_id: String,
    pub message_id: i32,
    pub sent_at: DateTime<Utc>,
}

/// One discovered proxy link.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    /// Canonical identity, unique per logical record.
    pub fingerprint: String,
    pub protocol: Protocol,
    /// Rewritten URI carrying the branding remark as its fragment.
    pub link: String,
    pub original_link: String,
    pub original_remark: String,
    pub server: String,
    pub port: u16,
    pub location: String,
    /// As scraped, e.g. `"45ms"`, or `"---"` when absent.
    pub ping: String,
    pub quality: QualityTier,
    /// Free-text provenance remark.
    pub source: String,
    pub delivery: Option<DeliveryMark>,
    pub bad_reports: u32,
    pub copy_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ConfigRecord {
    pub fn is_pending(&self) -> bool {
        self.delivery.is_none()
    }

    /// Flatten into hash fields for storage. Delivery fields are written
    /// only when the mark exists.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            (field::FINGERPRINT, self.fingerprint.clone()),
            (field::PROTOCOL, self.protocol.as_str().to_string()),
            (field::LINK, self.link.clone()),
            (field::ORIGINAL_LINK, self.original_link.clone()),
            (field::ORIGINAL_REMARK, self.original_remark.clone()),
            (field::SERVER, self.server.clone()),
            (field::PORT, self.port.to_string()),
            (field::LOCATION, self.location.clone()),
            (field::PING, self.ping.clone()),
            (field::QUALITY, self.quality.as_str().to_string()),
            (field::SOURCE, self.source.clone()),
            (field::BAD_REPORTS, self.bad_reports.to_string()),
            (field::COPY_COUNT, self.copy_count.to_string()),
            (field::CREATED_AT, self.created_at.to_rfc3339()),
        ];
        if let Some(mark) = &self.delivery {
            fields.push((field::CHANNEL_ID, mark.channel_id.clone()));
            fields.push((field::MESSAGE_ID, mark.message_id.to_string()));
            fields.push((field::SENT_AT, mark.sent_at.to_rfc3339()));
        }
        fields
    }

    /// Rebuild a record from a stored hash.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| -> String {
            fields.get(name).cloned().unwrap_or_default()
        };
        let protocol = Protocol::from_str(&get(field::PROTOCOL))
            .ok_or_else(|| anyhow!("unrecognized protocol tag: {:?}", get(field::PROTOCOL)))?;
        let quality =
            QualityTier::from_str(&get(field::QUALITY)).unwrap_or(QualityTier::Unknown);
        let created_at = DateTime::parse_from_rfc3339(&get(field::CREATED_AT))
            .map_err(|e| anyhow!("bad created_at: {e}"))?
            .with_timezone(&Utc);
        let delivery = match (fields.get(field::CHANNEL_ID), fields.get(field::MESSAGE_ID)) {
            (Some(channel_id), Some(message_id)) => Some(DeliveryMark {
                channel_id: channel_id.clone(),
                message_id: message_id.parse()?,
                sent_at: DateTime::parse_from_rfc3339(&get(field::SENT_AT))
                    .map_err(|e| anyhow!("bad sent_at: {e}"))?
                    .with_timezone(&Utc),
            }),
            _ => None,
        };
        Ok(ConfigRecord {
            fingerprint: get(field::FINGERPRINT),
            protocol,
            link: get(field::LINK),
            original_link: get(field::ORIGINAL_LINK),
            original_remark: get(field::ORIGINAL_REMARK),
            server: get(field::SERVER),
            port: get(field::PORT).parse().unwrap_or(0),
            location: get(field::LOCATION),
            ping: get(field::PING),
            quality,
            source: get(field::SOURCE),
            delivery,
            bad_reports: get(field::BAD_REPORTS).parse().unwrap_or(0),
            copy_count: get(field::COPY_COUNT).parse().unwrap_or(0),
            created_at,
        })
    }
}
