//! Outgoing message texts: channel posts, admin stats, settings views.

use crate::config::{setting, AppConfig};
use crate::record::ConfigRecord;
use crate::repository::DailyStats;
use chrono::Utc;
use std::collections::HashMap;
use teloxide::utils::html::escape;

/// Location label reduced to a hashtag: flag glyph dropped, separators
/// underscored, capped at 20 characters.
fn location_hashtag(location: &str) -> String {
    let label = match location.split_once(' ') {
        Some((_, rest)) => rest,
        None => location,
    };
    label
        .trim()
        .replace([' ', '-'], "_")
        .chars()
        .take(20)
        .collect()
}

fn timestamp() -> String {
    Utc::now().format("%H:%M - %Y/%m/%d").to_string()
}

/// The HTML body of one delivered config post.
pub fn channel_post(record: &ConfigRecord, config: &AppConfig) -> String {
    format!(
        "┏━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┓\n\
         ┃  🔷 {brand} Config Bot\n\
         ┃  ⚡️ Channel: {channel}\n\
         ┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛\n\
         \n\
         📂 {proto} config\n\
         📍 Location: {location}\n\
         📶 Ping: {ping} {glyph}\n\
         #{proto} #VPN #{brand} #{loc_tag}\n\
         🕒 {time}\n\
         \n\
         <code>{link}</code>\n\
         \n\
         ⚡️ Status: ✅ active as of this post\n\
         🔗 Share it around: {channel}",
        brand = config.brand_name,
        channel = config.brand_channel,
        proto = record.protocol.as_str(),
        location = record.location,
        ping = record.ping,
        glyph = record.quality.glyph(),
        loc_tag = location_hashtag(&record.location),
        time = timestamp(),
        link = escape(&record.link),
    )
}

/// Admin-facing stats summary.
pub fn admin_stats(total: u64, today: &DailyStats, queue: u64) -> String {
    let mut locations: Vec<(&String, &u64)> = today.locations.iter().collect();
    locations.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let location_lines = if locations.is_empty() {
        "• none".to_string()
    } else {
        locations
            .iter()
            .map(|(loc, count)| format!("• {loc}: {count}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "📊 Stats for {date}\n\
         \n\
         📤 Sent today: {count}\n\
         📈 Total configs: {total}\n\
         📋 In queue: {queue}\n\
         \n\
         🌍 Today's locations:\n\
         {location_lines}",
        date = today.date,
        count = today.count,
    )
}

/// Current settings, admin-facing.
pub fn settings_text(settings: &HashMap<String, String>) -> String {
    let get = |name: &str, default: &str| -> String {
        settings
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };
    let flag = |name: &str, default: &str| -> &'static str {
        if get(name, default) == "true" {
            "✅"
        } else {
            "❌"
        }
    };
    format!(
        "⚙️ Current settings:\n\
         \n\
         • batch size: {batch}\n\
         • interval: {interval}s\n\
         • delay: {delay}s\n\
         • daily limit: {limit}\n\
         • sending paused: {stopped}\n\
         • client list: {clients}\n\
         • reminder: {reminder}",
        batch = get(setting::BATCH_SIZE, "5"),
        interval = get(setting::INTERVAL, "120"),
        delay = get(setting::DELAY, "0"),
        limit = get(setting::DAILY_LIMIT, "200"),
        stopped = flag(setting::STOP_SENDING, "false"),
        clients = flag(setting::SEND_CLIENTS, "true"),
        reminder = flag(setting::REMINDER_ENABLED, "true"),
    )
}

/// Queue size plus a rough time-to-empty estimate from the current pacing
/// settings.
pub fn queue_status(queue: u64, batch_size: u64, interval: u64, delay: u64) -> String {
    if queue == 0 {
        return "✅ Queue is empty.".to_string();
    }
    let batch_size = batch_size.max(1);
    let batches = queue.div_ceil(batch_size);
    let total_seconds = batches * (interval + delay);
    format!(
        "📋 {queue} in queue | ⏱️ ~{} minutes to drain",
        total_seconds / 60
    )
}

/// Recommended client applications, posted on request.
pub fn clients_post(brand_channel: &str) -> String {
    format!(
        "📱 Recommended clients:\n\
         \n\
         🤖 Android:\n\
         • V2RayNG - github.com/2dust/v2rayNG\n\
         • SagerNet - github.com/SagerNet/SagerNet\n\
         \n\
         🍎 iOS:\n\
         • Streisand - App Store\n\
         • Shadowrocket - App Store\n\
         \n\
         💻 Windows:\n\
         • v2rayN - github.com/2dust/v2rayN\n\
         • Nekoray - github.com/MatsuriDayo/nekoray\n\
         \n\
         🐧 Linux/macOS:\n\
         • Nekoray - github.com/MatsuriDayo/nekoray\n\
         \n\
         ⚡️ Channel: {brand_channel}"
    )
}
