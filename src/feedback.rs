//! Crowd-sourced failure reporting and threshold-triggered retraction.

use crate::config::BAD_REPORT_THRESHOLD;
use crate::delivery::ConfigDelivery;
use crate::repository::ConfigRepository;
use anyhow::Result;
use std::sync::Arc;

/// Result of a confirmed bad report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub count: u32,
    pub retracted: bool,
}

pub struct FeedbackLoop {
    repo: ConfigRepository,
    delivery: Arc<dyn ConfigDelivery>,
}

impl FeedbackLoop {
    pub fn new(repo: ConfigRepository, delivery: Arc<dyn ConfigDelivery>) -> Self {
        FeedbackLoop { repo, delivery }
    }

    /// Record one confirmed bad report. At the threshold the delivered post
    /// is removed from its channel (best-effort) and the record is deleted;
    /// below it the count persists and the record stays live.
    pub async fn report_bad(&self, fingerprint: &str) -> Result<ReportOutcome> {
        let count = self.repo.increment_bad_report(fingerprint)?;
        if count < BAD_REPORT_THRESHOLD {
            return Ok(ReportOutcome {
                count,
                retracted: false,
            });
        }
        if let Some(record) = self.repo.get_by_fingerprint(fingerprint)? {
            if let Some(mark) = &record.delivery {
                if let Err(e) = self
                    .delivery
                    .retract(&mark.channel_id, mark.message_id)
                    .await
                {
                    log::warn!(
                        "could not remove post {}/{} for {fingerprint}: {e}",
                        mark.channel_id,
                        mark.message_id
                    );
                }
            }
            self.repo.delete(fingerprint)?;
            log::info!("retracted {fingerprint} after {count} bad reports");
        }
        Ok(ReportOutcome {
            count,
            retracted: true,
        })
    }

    /// Statistics-only counter behind the copy action; no retraction side
    /// effects.
    pub fn report_copy(&self, fingerprint: &str) -> Result<()> {
        self.repo.increment_copy_count(fingerprint)
    }
}
