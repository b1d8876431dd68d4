//! Durable store for records, settings, daily aggregates and the channel
//! registry, backed by Redis.
//!
//! Records live under a numeric sequence id (`cfg:record:<id>`) with a
//! fingerprint index (`cfg:fp:<fingerprint>` -> id) and a sorted set scoring
//! ids by creation epoch. Counters use single-command increments; the
//! remaining read-modify-write sequences rely on the single-writer
//! discipline of the drain lock and the admin handlers.

use crate::config::{field, key, setting, DEFAULT_SETTINGS};
use crate::identity::fingerprint;
use crate::record::{ConfigRecord, DeliveryMark};
use anyhow::Result;
use chrono::Utc;
use redis::Commands;
use std::collections::HashMap;

/// Aggregate for one calendar date.
#[derive(Debug, Clone, Default)]
pub struct DailyStats {
    pub date: String,
    pub count: u64,
    pub locations: HashMap<String, u64>,
}

#[derive(Clone)]
pub struct ConfigRepository {
    client: redis::Client,
}

impl ConfigRepository {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(ConfigRepository { client })
    }

    fn conn(&self) -> Result<redis::Connection> {
        Ok(self.client.get_connection()?)
    }

    /// Write missing default settings and seed the channel registry from
    /// configuration. Existing values are left alone.
    pub fn init(&self, channels: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        for (name, value) in DEFAULT_SETTINGS {
            let _: bool = conn.hset_nx(key::SETTINGS, name, value)?;
        }
        for channel in channels {
            let _: bool = conn.sadd(key::CHANNELS, channel)?;
        }
        Ok(())
    }

    fn record_key(id: u64) -> String {
        format!("{}{}", key::RECORD_PREFIX, id)
    }

    fn fp_key(fp: &str) -> String {
        format!("{}{}", key::FINGERPRINT_PREFIX, fp)
    }

    fn stats_key(date: &str) -> String {
        format!("{}{}", key::STATS_PREFIX, date)
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn id_of(&self, conn: &mut redis::Connection, fp: &str) -> Result<Option<u64>> {
        Ok(conn.get(Self::fp_key(fp))?)
    }

    // ----- records -----

    /// Insert a record, or merge the extraction-derived fields into the row
    /// already holding its fingerprint. Returns `true` on a true insert,
    /// which is also the only case that bumps the `total_configs` counter.
    /// Delivery state, counters and `created_at` survive a merge.
    pub fn upsert(&self, record: &ConfigRecord) -> Result<bool> {
        let mut conn = self.conn()?;
        if let Some(id) = self.id_of(&mut conn, &record.fingerprint)? {
            let fields: Vec<(&str, String)> = vec![
                (field::PROTOCOL, record.protocol.as_str().to_string()),
                (field::LINK, record.link.clone()),
                (field::ORIGINAL_LINK, record.original_link.clone()),
                (field::ORIGINAL_REMARK, record.original_remark.clone()),
                (field::SERVER, record.server.clone()),
                (field::PORT, record.port.to_string()),
                (field::LOCATION, record.location.clone()),
                (field::PING, record.ping.clone()),
                (field::QUALITY, record.quality.as_str().to_string()),
                (field::SOURCE, record.source.clone()),
            ];
            let _: () = conn.hset_multiple(Self::record_key(id), &fields)?;
            return Ok(false);
        }
        let id: u64 = conn.incr(key::RECORD_SEQ, 1)?;
        let mut stored = record.clone();
        stored.created_at = Utc::now();
        let _: () = conn.hset_multiple(Self::record_key(id), &stored.to_fields())?;
        let _: () = conn.set(Self::fp_key(&record.fingerprint), id)?;
        let _: () = conn.zadd(key::CREATED_INDEX, id, stored.created_at.timestamp())?;
        let _: i64 = conn.hincr(key::SETTINGS, setting::TOTAL_CONFIGS, 1)?;
        Ok(true)
    }

    /// Upsert a batch, returning how many were true inserts.
    pub fn ingest(&self, records: &[ConfigRecord]) -> Result<u64> {
        let mut inserted = 0;
        for record in records {
            if self.upsert(record)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Existence check on the derived fingerprint, used at the ingestion
    /// boundary to avoid re-queuing links already seen.
    pub fn is_duplicate(&self, link: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        Ok(conn.exists(Self::fp_key(&fingerprint(link)))?)
    }

    pub fn get_by_fingerprint(&self, fp: &str) -> Result<Option<ConfigRecord>> {
        let mut conn = self.conn()?;
        let Some(id) = self.id_of(&mut conn, fp)? else {
            return Ok(None);
        };
        let fields: HashMap<String, String> = conn.hgetall(Self::record_key(id))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(ConfigRecord::from_fields(&fields)?))
    }

    /// Remove a record and its index entries. Returns whether it existed.
    pub fn delete(&self, fp: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let Some(id) = self.id_of(&mut conn, fp)? else {
            return Ok(false);
        };
        let _: () = conn.del(Self::record_key(id))?;
        let _: () = conn.del(Self::fp_key(fp))?;
        let _: () = conn.zrem(key::CREATED_INDEX, id)?;
        Ok(true)
    }

    /// Pending records (no delivery mark) in creation order, up to `limit`
    /// when given.
    pub fn list_pending(&self, limit: Option<usize>) -> Result<Vec<ConfigRecord>> {
        let mut conn = self.conn()?;
        let ids: Vec<u64> = conn.zrange(key::CREATED_INDEX, 0, -1)?;
        let mut pending = Vec::new();
        for id in ids {
            if let Some(max) = limit {
                if pending.len() >= max {
                    break;
                }
            }
            let fields: HashMap<String, String> = conn.hgetall(Self::record_key(id))?;
            if fields.is_empty() {
                continue;
            }
            let record = ConfigRecord::from_fields(&fields)?;
            if record.is_pending() {
                pending.push(record);
            }
        }
        Ok(pending)
    }

    pub fn count_pending(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        let ids: Vec<u64> = conn.zrange(key::CREATED_INDEX, 0, -1)?;
        let mut count = 0;
        for id in ids {
            let delivered: bool = conn.hexists(Self::record_key(id), field::MESSAGE_ID)?;
            let exists: bool = conn.exists(Self::record_key(id))?;
            if exists && !delivered {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Deliveries recorded against today's aggregate; the quota counter the
    /// drain loop checks before each delivery.
    pub fn count_sent_today(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        let count: Option<u64> =
            conn.hget(Self::stats_key(&Self::today()), field::STATS_COUNT)?;
        Ok(count.unwrap_or(0))
    }

    /// Persist the delivery coordinates on a record.
    pub fn mark_sent(&self, fp: &str, mark: &DeliveryMark) -> Result<()> {
        let mut conn = self.conn()?;
        if let Some(id) = self.id_of(&mut conn, fp)? {
            let fields: Vec<(&str, String)> = vec![
                (field::CHANNEL_ID, mark.channel_id.clone()),
                (field::MESSAGE_ID, mark.message_id.to_string()),
                (field::SENT_AT, mark.sent_at.to_rfc3339()),
            ];
            let _: () = conn.hset_multiple(Self::record_key(id), &fields)?;
        }
        Ok(())
    }

    /// Atomically bump the bad-report counter, returning the new count.
    /// A missing record reports 0.
    pub fn increment_bad_report(&self, fp: &str) -> Result<u32> {
        let mut conn = self.conn()?;
        let Some(id) = self.id_of(&mut conn, fp)? else {
            return Ok(0);
        };
        let count: i64 = conn.hincr(Self::record_key(id), field::BAD_REPORTS, 1)?;
        Ok(count.max(0) as u32)
    }

    pub fn increment_copy_count(&self, fp: &str) -> Result<()> {
        let mut conn = self.conn()?;
        if let Some(id) = self.id_of(&mut conn, fp)? {
            let _: i64 = conn.hincr(Self::record_key(id), field::COPY_COUNT, 1)?;
        }
        Ok(())
    }

    // ----- settings -----

    /// A missing setting is the caller's default, never an error.
    pub fn get_setting(&self, name: &str, default: &str) -> Result<String> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.hget(key::SETTINGS, name)?;
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let _: () = conn.hset(key::SETTINGS, name, value)?;
        Ok(())
    }

    /// Flip a boolean setting, returning the new value.
    pub fn toggle_setting(&self, name: &str) -> Result<bool> {
        let current = self.get_setting(name, "false")?;
        let flipped = current != "true";
        self.set_setting(name, if flipped { "true" } else { "false" })?;
        Ok(flipped)
    }

    pub fn all_settings(&self) -> Result<HashMap<String, String>> {
        let mut conn = self.conn()?;
        Ok(conn.hgetall(key::SETTINGS)?)
    }

    pub fn total_configs(&self) -> Result<u64> {
        Ok(self
            .get_setting(setting::TOTAL_CONFIGS, "0")?
            .parse()
            .unwrap_or(0))
    }

    // ----- daily stats -----

    /// Bump today's delivered count and the histogram bucket for the
    /// canonicalized location key (the label with its flag glyph dropped).
    pub fn increment_daily_count(&self, location: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let stats_key = Self::stats_key(&Self::today());
        let _: i64 = conn.hincr(&stats_key, field::STATS_COUNT, 1)?;
        let loc_key = canonical_location_key(location);
        if !loc_key.is_empty() {
            let bucket = format!("{}{}", field::STATS_LOC_PREFIX, loc_key);
            let _: i64 = conn.hincr(&stats_key, bucket, 1)?;
        }
        Ok(())
    }

    /// Aggregate for `date` (ISO `YYYY-MM-DD`), defaulting to today. A date
    /// with no activity reads as zeros.
    pub fn get_daily_stats(&self, date: Option<&str>) -> Result<DailyStats> {
        let date = date.map(String::from).unwrap_or_else(Self::today);
        let mut conn = self.conn()?;
        let fields: HashMap<String, String> = conn.hgetall(Self::stats_key(&date))?;
        let mut stats = DailyStats {
            date,
            ..DailyStats::default()
        };
        for (name, value) in fields {
            if name == field::STATS_COUNT {
                stats.count = value.parse().unwrap_or(0);
            } else if let Some(loc) = name.strip_prefix(field::STATS_LOC_PREFIX) {
                stats
                    .locations
                    .insert(loc.to_string(), value.parse().unwrap_or(0));
            }
        }
        Ok(stats)
    }

    // ----- channels -----

    pub fn add_channel(&self, channel: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        Ok(conn.sadd(key::CHANNELS, channel)?)
    }

    pub fn remove_channel(&self, channel: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        Ok(conn.srem(key::CHANNELS, channel)?)
    }

    pub fn list_channels(&self) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        Ok(conn.smembers(key::CHANNELS)?)
    }

    // ----- maintenance -----

    /// Delete records created earlier than `days` ago, plus stats hashes for
    /// dates older than the same cutoff. Returns the record count removed.
    pub fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let mut conn = self.conn()?;
        let cutoff = Utc::now().timestamp() - i64::from(days) * 86_400;
        let ids: Vec<u64> = conn.zrangebyscore(key::CREATED_INDEX, "-inf", cutoff)?;
        let mut deleted = 0;
        for id in ids {
            let fp: Option<String> = conn.hget(Self::record_key(id), field::FINGERPRINT)?;
            let _: () = conn.del(Self::record_key(id))?;
            let _: () = conn.zrem(key::CREATED_INDEX, id)?;
            if let Some(fp) = fp {
                // Only drop the index entry if it still points at this row.
                let indexed: Option<u64> = conn.get(Self::fp_key(&fp))?;
                if indexed == Some(id) {
                    let _: () = conn.del(Self::fp_key(&fp))?;
                }
            }
            deleted += 1;
        }
        let cutoff_date = Utc::now()
            .date_naive()
            .checked_sub_days(chrono::Days::new(u64::from(days)));
        if let Some(cutoff_date) = cutoff_date {
            let stat_keys: Vec<String> = conn.keys(format!("{}*", key::STATS_PREFIX))?;
            for stat_key in stat_keys {
                let Some(date) = stat_key.strip_prefix(key::STATS_PREFIX) else {
                    continue;
                };
                if let Ok(date) = date.parse::<chrono::NaiveDate>() {
                    if date < cutoff_date {
                        let _: () = conn.del(&stat_key)?;
                    }
                }
            }
        }
        Ok(deleted)
    }

    /// Durable counterpart of the extractor's in-run collapse: walk records
    /// in creation order, keep the earliest per fingerprint, delete the rest
    /// and repoint the index at the survivor. Returns the count removed.
    pub fn collapse_duplicates(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        let ids: Vec<u64> = conn.zrange(key::CREATED_INDEX, 0, -1)?;
        let mut earliest: HashMap<String, u64> = HashMap::new();
        let mut deleted = 0;
        for id in ids {
            let fp: Option<String> = conn.hget(Self::record_key(id), field::FINGERPRINT)?;
            let Some(fp) = fp else {
                // Dangling index entry with no hash behind it.
                let _: () = conn.zrem(key::CREATED_INDEX, id)?;
                continue;
            };
            match earliest.get(&fp) {
                None => {
                    earliest.insert(fp.clone(), id);
                    let _: () = conn.set(Self::fp_key(&fp), id)?;
                }
                Some(_) => {
                    let _: () = conn.del(Self::record_key(id))?;
                    let _: () = conn.zrem(key::CREATED_INDEX, id)?;
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

/// Histogram key for a location label: the label minus its leading flag
/// glyph (the last whitespace-separated token when the label has several).
fn canonical_location_key(location: &str) -> String {
    match location.split_once(' ') {
        Some((_, rest)) => rest.trim().to_string(),
        None => location.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_location_key;

    #[test]
    fn location_key_drops_flag_glyph() {
        assert_eq!(canonical_location_key("🇩🇪 Germany"), "Germany");
        assert_eq!(canonical_location_key("🇰🇷 South Korea"), "South Korea");
        assert_eq!(canonical_location_key("Germany"), "Germany");
    }
}
