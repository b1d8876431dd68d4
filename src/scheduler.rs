//! Batched, rate-limited distribution of pending records.
//!
//! One drain walks the pending queue in randomized order, re-reading the
//! pause flag and the daily quota before every delivery. A drain-level mutex
//! keeps the scheduled and manual triggers from racing the quota check.

use crate::config::{setting, MIN_LOOP_INTERVAL_SECS};
use crate::delivery::ConfigDelivery;
use crate::record::{ConfigRecord, DeliveryMark};
use crate::repository::ConfigRepository;
use anyhow::Result;
use chrono::Utc;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// What started a drain. Both paths share the same primitive, so throttling
/// is identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    Scheduled,
    Manual,
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every fetched record was attempted.
    Completed,
    /// The daily quota was reached; the rest stays pending for tomorrow.
    DailyLimitReached,
    /// The pause flag was set; the rest stays pending.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: u32,
    pub failed: u32,
    /// Records fetched but never attempted because the drain aborted.
    pub deferred: u32,
    pub outcome: DrainOutcome,
}

pub struct Scheduler {
    repo: ConfigRepository,
    delivery: Arc<dyn ConfigDelivery>,
    /// At most one drain may be active; overlapping triggers queue here.
    drain_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(repo: ConfigRepository, delivery: Arc<dyn ConfigDelivery>) -> Self {
        Scheduler {
            repo,
            delivery,
            drain_lock: Mutex::new(()),
        }
    }

    fn setting_u64(&self, name: &str, default: u64) -> Result<u64> {
        let raw = self.repo.get_setting(name, &default.to_string())?;
        Ok(raw.parse().unwrap_or(default))
    }

    fn stop_requested(&self) -> Result<bool> {
        Ok(self.repo.get_setting(setting::STOP_SENDING, "false")? == "true")
    }

    /// Drain up to `limit` pending records (all of them when `None`),
    /// enforcing the pause flag, the daily quota and the pacing settings
    /// read at drain start.
    pub async fn drain(&self, trigger: DrainTrigger, limit: Option<usize>) -> Result<DrainReport> {
        let _guard = self.drain_lock.lock().await;

        let batch_size = self.setting_u64(setting::BATCH_SIZE, 5)?.max(1) as usize;
        let interval = self.setting_u64(setting::INTERVAL, 120)?;
        let delay = self.setting_u64(setting::DELAY, 0)?;
        let daily_limit = self.setting_u64(setting::DAILY_LIMIT, 200)?;

        let mut records = self.repo.list_pending(limit)?;
        records.shuffle(&mut rand::rng());
        let total = records.len();

        let channels = self.repo.list_channels()?;
        if channels.is_empty() && !records.is_empty() {
            log::warn!("no destination channels registered; deferring {total} records");
            return Ok(DrainReport {
                delivered: 0,
                failed: 0,
                deferred: total as u32,
                outcome: DrainOutcome::Completed,
            });
        }

        let mut delivered: u32 = 0;
        let mut failed: u32 = 0;
        let mut processed = 0usize;

        for (batch_index, batch) in records.chunks(batch_size).enumerate() {
            if batch_index > 0 && interval > 0 {
                sleep(Duration::from_secs(interval)).await;
            }
            for record in batch {
                if self.stop_requested()? {
                    log::info!("drain ({trigger:?}) stopped by setting after {processed} records");
                    return Ok(DrainReport {
                        delivered,
                        failed,
                        deferred: (total - processed) as u32,
                        outcome: DrainOutcome::Stopped,
                    });
                }
                if self.repo.count_sent_today()? >= daily_limit {
                    log::info!("drain ({trigger:?}) hit the daily limit of {daily_limit}");
                    return Ok(DrainReport {
                        delivered,
                        failed,
                        deferred: (total - processed) as u32,
                        outcome: DrainOutcome::DailyLimitReached,
                    });
                }

                if self.deliver_record(&channels, record).await? {
                    delivered += 1;
                } else {
                    failed += 1;
                }
                processed += 1;

                if delay > 0 {
                    sleep(Duration::from_secs(delay)).await;
                }
            }
        }

        log::info!(
            "drain ({trigger:?}) completed: {delivered} delivered, {failed} failed"
        );
        Ok(DrainReport {
            delivered,
            failed,
            deferred: 0,
            outcome: DrainOutcome::Completed,
        })
    }

    /// Post one record to every registered channel. The first successful
    /// receipt becomes the record's delivery mark; the aggregate increments
    /// strictly after that success. A record that lands nowhere stays
    /// pending and reports `false`.
    async fn deliver_record(&self, channels: &[String], record: &ConfigRecord) -> Result<bool> {
        let mut receipt = None;
        for channel in channels {
            match self.delivery.deliver(channel, record).await {
                Ok(r) => {
                    if receipt.is_none() {
                        receipt = Some(r);
                    }
                }
                Err(e) => {
                    log::warn!(
                        "delivering {} to {channel} failed: {e}",
                        record.fingerprint
                    );
                }
            }
        }
        let Some(receipt) = receipt else {
            return Ok(false);
        };
        self.repo.mark_sent(
            &record.fingerprint,
            &DeliveryMark {
                channel_id: receipt.channel_id,
                message_id: receipt.message_id,
                sent_at: Utc::now(),
            },
        )?;
        self.repo.increment_daily_count(&record.location)?;
        Ok(true)
    }

    /// Background loop: drain, then sleep the current `interval` setting
    /// (re-read each cycle) before the next pass. Errors are logged and the
    /// loop continues.
    pub async fn run_periodic(self: Arc<Self>) {
        loop {
            match self.drain(DrainTrigger::Scheduled, None).await {
                Ok(report) => {
                    if report.delivered > 0 || report.failed > 0 {
                        log::info!(
                            "scheduled drain: {} delivered, {} failed, {} deferred",
                            report.delivered,
                            report.failed,
                            report.deferred
                        );
                    }
                }
                Err(e) => log::error!("scheduled drain failed: {e}"),
            }
            let interval = self
                .setting_u64(setting::INTERVAL, 120)
                .unwrap_or(120)
                .max(MIN_LOOP_INTERVAL_SECS);
            sleep(Duration::from_secs(interval)).await;
        }
    }
}
