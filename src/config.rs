//! Centralized configuration: Redis keys, setting names and defaults, tuning
//! constants, and the process-wide environment configuration.

use anyhow::{bail, Result};
use std::env;

/// **Redis Key Prefixes:** identify categories of data stored in Redis.
pub mod key {
    /// Prefix for record hashes (e.g. `"cfg:record:<id>"`).
    pub const RECORD_PREFIX: &str = "cfg:record:";
    /// Prefix for the fingerprint index (e.g. `"cfg:fp:<fingerprint>"` -> id).
    pub const FINGERPRINT_PREFIX: &str = "cfg:fp:";
    /// Prefix for daily stats hashes (e.g. `"cfg:stats:<YYYY-MM-DD>"`).
    pub const STATS_PREFIX: &str = "cfg:stats:";
    /// Sorted set of record ids scored by creation epoch.
    pub const CREATED_INDEX: &str = "cfg:created";
    /// Counter producing record ids.
    pub const RECORD_SEQ: &str = "cfg:seq";
    /// Hash of admin-tunable settings.
    pub const SETTINGS: &str = "cfg:settings";
    /// Set of destination channel identifiers.
    pub const CHANNELS: &str = "cfg:channels";
}

/// **Record Hash Fields:** keys within a `cfg:record:<id>` hash.
pub mod field {
    pub const FINGERPRINT: &str = "fingerprint";
    pub const PROTOCOL: &str = "protocol";
    pub const LINK: &str = "link";
    pub const ORIGINAL_LINK: &str = "original_link";
    pub const ORIGINAL_REMARK: &str = "original_remark";
    pub const SERVER: &str = "server";
    pub const PORT: &str = "port";
    pub const LOCATION: &str = "location";
    pub const PING: &str = "ping";
    pub const QUALITY: &str = "quality";
    pub const SOURCE: &str = "source";
    pub const CHANNEL_ID: &str = "channel_id";
    pub const MESSAGE_ID: &str = "message_id";
    pub const BAD_REPORTS: &str = "bad_reports";
    pub const COPY_COUNT: &str = "copy_count";
    pub const CREATED_AT: &str = "created_at";
    pub const SENT_AT: &str = "sent_at";
    /// Field within a daily stats hash holding the delivered count.
    pub const STATS_COUNT: &str = "count";
    /// Prefix for per-location fields within a daily stats hash.
    pub const STATS_LOC_PREFIX: &str = "loc:";
}

/// **Setting Names:** admin-tunable keys in the `cfg:settings` hash.
pub mod setting {
    /// Records delivered per batch.
    pub const BATCH_SIZE: &str = "batch_size";
    /// Seconds between batches.
    pub const INTERVAL: &str = "interval";
    /// Seconds slept after each delivery.
    pub const DELAY: &str = "delay";
    /// Maximum deliveries per calendar day.
    pub const DAILY_LIMIT: &str = "daily_limit";
    /// When `"true"`, drains abort before the next delivery.
    pub const STOP_SENDING: &str = "stop_sending";
    /// When `"true"`, the renewal reminder is posted.
    pub const REMINDER_ENABLED: &str = "reminder_enabled";
    /// When `"true"`, the recommended-clients post accompanies deliveries.
    pub const SEND_CLIENTS: &str = "send_clients";
    /// Running total of records ever inserted.
    pub const TOTAL_CONFIGS: &str = "total_configs";
}

/// Settings written on first initialization; existing values are never
/// overwritten.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (setting::SEND_CLIENTS, "true"),
    (setting::BATCH_SIZE, "5"),
    (setting::INTERVAL, "120"),
    (setting::DELAY, "0"),
    (setting::REMINDER_ENABLED, "true"),
    (setting::DAILY_LIMIT, "200"),
    (setting::STOP_SENDING, "false"),
    (setting::TOTAL_CONFIGS, "0"),
];

/// Confirmed bad reports after which a record is retracted.
pub const BAD_REPORT_THRESHOLD: u32 = 5;

/// Characters of surrounding text searched for ping/location/host hints.
pub const CONTEXT_RADIUS: usize = 500;

/// Fingerprints are truncated to this many characters.
pub const FINGERPRINT_MAX_CHARS: usize = 50;

/// Maximum accepted archive upload, in bytes.
pub const MAX_UPLOAD_BYTES: u32 = 10 * 1024 * 1024;

/// Floor for the background drain loop's sleep so a zeroed `interval`
/// setting cannot make it spin.
pub const MIN_LOOP_INTERVAL_SECS: u64 = 30;

/// Ordered location table: (needle, flag, canonical name). Iterated in
/// order, first needle contained in the context window wins, so localized
/// names come before English names and bare country codes come last.
pub const LOCATION_FLAGS: &[(&str, &str, &str)] = &[
    ("آلمان", "🇩🇪", "Germany"),
    ("Deutschland", "🇩🇪", "Germany"),
    ("Germany", "🇩🇪", "Germany"),
    ("هلند", "🇳🇱", "Netherlands"),
    ("Holland", "🇳🇱", "Netherlands"),
    ("Netherlands", "🇳🇱", "Netherlands"),
    ("آمریکا", "🇺🇸", "USA"),
    ("United States", "🇺🇸", "USA"),
    ("America", "🇺🇸", "USA"),
    ("USA", "🇺🇸", "USA"),
    ("انگلیس", "🇬🇧", "UK"),
    ("United Kingdom", "🇬🇧", "UK"),
    ("Britain", "🇬🇧", "UK"),
    ("England", "🇬🇧", "UK"),
    ("فرانسه", "🇫🇷", "France"),
    ("France", "🇫🇷", "France"),
    ("سنگاپور", "🇸🇬", "Singapore"),
    ("Singapore", "🇸🇬", "Singapore"),
    ("ژاپن", "🇯🇵", "Japan"),
    ("Japan", "🇯🇵", "Japan"),
    ("ایران", "🇮🇷", "Iran"),
    ("Tehran", "🇮🇷", "Iran"),
    ("Iran", "🇮🇷", "Iran"),
    ("ترکیه", "🇹🇷", "Turkey"),
    ("Türkiye", "🇹🇷", "Turkey"),
    ("Turkey", "🇹🇷", "Turkey"),
    ("روسیه", "🇷🇺", "Russia"),
    ("Russia", "🇷🇺", "Russia"),
    ("کانادا", "🇨🇦", "Canada"),
    ("Canada", "🇨🇦", "Canada"),
    ("Australia", "🇦🇺", "Australia"),
    ("India", "🇮🇳", "India"),
    ("Brazil", "🇧🇷", "Brazil"),
    ("Finland", "🇫🇮", "Finland"),
    ("Sweden", "🇸🇪", "Sweden"),
    ("Switzerland", "🇨🇭", "Switzerland"),
    ("Poland", "🇵🇱", "Poland"),
    ("Spain", "🇪🇸", "Spain"),
    ("Italy", "🇮🇹", "Italy"),
    ("Austria", "🇦🇹", "Austria"),
    ("Hong Kong", "🇭🇰", "Hong Kong"),
    ("South Korea", "🇰🇷", "South Korea"),
    ("Korea", "🇰🇷", "South Korea"),
    ("Dubai", "🇦🇪", "UAE"),
    ("UAE", "🇦🇪", "UAE"),
    ("Israel", "🇮🇱", "Israel"),
    ("کلودفلر", "☁️", "Cloudflare"),
    ("Cloudflare", "☁️", "Cloudflare"),
    // Bare codes last: needles like "US" false-positive too easily.
    ("DE", "🇩🇪", "Germany"),
    ("NL", "🇳🇱", "Netherlands"),
    ("US", "🇺🇸", "USA"),
    ("UK", "🇬🇧", "UK"),
    ("FR", "🇫🇷", "France"),
    ("SG", "🇸🇬", "Singapore"),
    ("JP", "🇯🇵", "Japan"),
    ("IR", "🇮🇷", "Iran"),
    ("TR", "🇹🇷", "Turkey"),
    ("RU", "🇷🇺", "Russia"),
    ("CA", "🇨🇦", "Canada"),
    ("HK", "🇭🇰", "Hong Kong"),
    ("KR", "🇰🇷", "South Korea"),
];

/// Label used when no location hint is found near a link.
pub const UNKNOWN_LOCATION: &str = "🌍 Unknown";

/// Process-wide configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    /// Numeric Telegram id of the single administrator.
    pub admin_id: u64,
    /// Destination channels seeded into the registry at startup.
    pub channels: Vec<String>,
    pub redis_url: String,
    pub brand_name: String,
    pub brand_channel: String,
    /// Remark written into every rewritten link fragment.
    pub branding_remark: String,
}

impl AppConfig {
    /// Read configuration from the environment. `BOT_TOKEN` and `ADMIN_ID`
    /// are required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let bot_token = match env::var("BOT_TOKEN") {
            Ok(v) if !v.is_empty() => v,
            _ => bail!("BOT_TOKEN must be set"),
        };
        let admin_id = match env::var("ADMIN_ID") {
            Ok(v) => v.parse::<u64>()?,
            Err(_) => bail!("ADMIN_ID must be set"),
        };
        let channels = env::var("CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        let brand_name = env::var("BRAND_NAME").unwrap_or_else(|_| "Courier".to_string());
        let brand_channel =
            env::var("BRAND_CHANNEL").unwrap_or_else(|_| "@courierconfigs".to_string());
        let branding_remark = env::var("CONFIG_REMARK")
            .unwrap_or_else(|_| format!("{} | {}", brand_name, brand_channel));
        Ok(AppConfig {
            bot_token,
            admin_id,
            channels,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            brand_name,
            brand_channel,
            branding_remark,
        })
    }
}
