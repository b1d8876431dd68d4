//! tests/scheduler_tests.rs
//!
//! Drain behavior against a **real** Redis back-end and a recording
//! stand-in for the delivery primitive. Pacing settings are zeroed so the
//! drains run without real timers.
//!
//! Redis **must** be running on 127.0.0.1:6379 (override with REDIS_URL).

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use config_courier_bot::config::setting;
use config_courier_bot::delivery::{ConfigDelivery, DeliveryReceipt};
use config_courier_bot::record::{ConfigRecord, Protocol, QualityTier};
use config_courier_bot::repository::ConfigRepository;
use config_courier_bot::scheduler::{DrainOutcome, DrainTrigger, Scheduler};
use redis::Commands;
use serial_test::serial;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

fn flush_redis() {
    let client = redis::Client::open(redis_url()).expect("Failed to connect to Redis");
    let mut conn = client.get_connection().expect("Failed to connect to Redis");
    let _: () = conn.flushdb().expect("Failed to flush Redis");
}

struct MockDelivery {
    sent: Mutex<Vec<(String, String)>>,
    fail_fingerprint: Option<String>,
    next_id: AtomicI32,
}

impl MockDelivery {
    fn new(fail_fingerprint: Option<&str>) -> Arc<Self> {
        Arc::new(MockDelivery {
            sent: Mutex::new(Vec::new()),
            fail_fingerprint: fail_fingerprint.map(String::from),
            next_id: AtomicI32::new(1),
        })
    }

    fn sent_fingerprints(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, fp)| fp.clone()).collect()
    }
}

#[async_trait]
impl ConfigDelivery for MockDelivery {
    async fn deliver(&self, channel: &str, record: &ConfigRecord) -> anyhow::Result<DeliveryReceipt> {
        if self.fail_fingerprint.as_deref() == Some(record.fingerprint.as_str()) {
            bail!("simulated outage");
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), record.fingerprint.clone()));
        Ok(DeliveryReceipt {
            channel_id: channel.to_string(),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn retract(&self, _channel: &str, _message_id: i32) -> anyhow::Result<()> {
        Ok(())
    }
}

fn make_record(i: usize) -> ConfigRecord {
    ConfigRecord {
        fingerprint: format!("fp-{i}"),
        protocol: Protocol::Vless,
        link: format!("vless://fp-{i}@1.2.3.4:443#Brand"),
        original_link: format!("vless://fp-{i}@1.2.3.4:443#Old"),
        original_remark: "Old".to_string(),
        server: "1.2.3.4".to_string(),
        port: 443,
        location: "🇩🇪 Germany".to_string(),
        ping: "42ms".to_string(),
        quality: QualityTier::Green,
        source: "Old".to_string(),
        delivery: None,
        bad_reports: 0,
        copy_count: 0,
        created_at: Utc::now(),
    }
}

/// Repository with zeroed pacing, one channel and `n` pending records.
fn seed(n: usize, daily_limit: u64, batch_size: u64) -> ConfigRepository {
    flush_redis();
    let repo = ConfigRepository::new(&redis_url()).unwrap();
    repo.init(&["@chan".to_string()]).unwrap();
    repo.set_setting(setting::INTERVAL, "0").unwrap();
    repo.set_setting(setting::DELAY, "0").unwrap();
    repo.set_setting(setting::DAILY_LIMIT, &daily_limit.to_string())
        .unwrap();
    repo.set_setting(setting::BATCH_SIZE, &batch_size.to_string())
        .unwrap();
    for i in 0..n {
        repo.upsert(&make_record(i)).unwrap();
    }
    repo
}

#[tokio::test]
#[serial]
async fn drain_delivers_everything_and_marks_records_sent() {
    let repo = seed(4, 200, 5);
    let mock = MockDelivery::new(None);
    let scheduler = Scheduler::new(repo.clone(), mock.clone());

    let report = scheduler.drain(DrainTrigger::Scheduled, None).await.unwrap();
    assert_eq!(report.delivered, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.outcome, DrainOutcome::Completed);

    assert_eq!(repo.count_pending().unwrap(), 0);
    assert_eq!(repo.count_sent_today().unwrap(), 4);
    let stored = repo.get_by_fingerprint("fp-0").unwrap().unwrap();
    let mark = stored.delivery.expect("delivered record carries a mark");
    assert_eq!(mark.channel_id, "@chan");
    let stats = repo.get_daily_stats(None).unwrap();
    assert_eq!(stats.locations.get("Germany"), Some(&4));
}

#[tokio::test]
#[serial]
async fn drain_never_exceeds_the_daily_limit() {
    let repo = seed(10, 7, 3);
    let mock = MockDelivery::new(None);
    let scheduler = Scheduler::new(repo.clone(), mock.clone());

    let report = scheduler.drain(DrainTrigger::Scheduled, None).await.unwrap();
    assert_eq!(report.delivered, 7);
    assert_eq!(report.outcome, DrainOutcome::DailyLimitReached);
    assert_eq!(report.deferred, 3);
    assert_eq!(repo.count_pending().unwrap(), 3);

    // Re-invoking on the same day delivers nothing more.
    let again = scheduler.drain(DrainTrigger::Manual, None).await.unwrap();
    assert_eq!(again.delivered, 0);
    assert_eq!(again.outcome, DrainOutcome::DailyLimitReached);
    assert_eq!(repo.count_pending().unwrap(), 3);
    assert_eq!(repo.count_sent_today().unwrap(), 7);
    assert_eq!(mock.sent_fingerprints().len(), 7);
}

#[tokio::test]
#[serial]
async fn drain_stops_before_the_first_delivery_when_paused() {
    let repo = seed(5, 200, 5);
    repo.set_setting(setting::STOP_SENDING, "true").unwrap();
    let mock = MockDelivery::new(None);
    let scheduler = Scheduler::new(repo.clone(), mock.clone());

    let report = scheduler.drain(DrainTrigger::Scheduled, None).await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.deferred, 5);
    assert_eq!(report.outcome, DrainOutcome::Stopped);
    assert_eq!(repo.count_pending().unwrap(), 5);
    assert!(mock.sent_fingerprints().is_empty());
}

#[tokio::test]
#[serial]
async fn failed_delivery_leaves_the_record_for_the_next_drain() {
    let repo = seed(3, 200, 5);
    let flaky = MockDelivery::new(Some("fp-1"));
    let scheduler = Scheduler::new(repo.clone(), flaky.clone());

    let report = scheduler.drain(DrainTrigger::Scheduled, None).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.outcome, DrainOutcome::Completed);
    assert_eq!(repo.count_pending().unwrap(), 1);
    assert!(repo
        .get_by_fingerprint("fp-1")
        .unwrap()
        .unwrap()
        .is_pending());

    // The failure healed: the next drain picks the record up again.
    let healed = MockDelivery::new(None);
    let scheduler = Scheduler::new(repo.clone(), healed.clone());
    let report = scheduler.drain(DrainTrigger::Manual, None).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(healed.sent_fingerprints(), vec!["fp-1"]);
}

#[tokio::test]
#[serial]
async fn manual_drain_honors_its_limit() {
    let repo = seed(6, 200, 5);
    let mock = MockDelivery::new(None);
    let scheduler = Scheduler::new(repo.clone(), mock.clone());

    let report = scheduler.drain(DrainTrigger::Manual, Some(2)).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.outcome, DrainOutcome::Completed);
    assert_eq!(repo.count_pending().unwrap(), 4);
}
