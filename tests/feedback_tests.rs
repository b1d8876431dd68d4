//! tests/feedback_tests.rs
//!
//! Threshold-triggered retraction against a **real** Redis back-end with a
//! recording stand-in for the delete-message primitive.
//!
//! Redis **must** be running on 127.0.0.1:6379 (override with REDIS_URL).

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use config_courier_bot::delivery::{ConfigDelivery, DeliveryReceipt};
use config_courier_bot::feedback::FeedbackLoop;
use config_courier_bot::record::{ConfigRecord, DeliveryMark, Protocol, QualityTier};
use config_courier_bot::repository::ConfigRepository;
use redis::Commands;
use serial_test::serial;
use std::sync::{Arc, Mutex};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

fn flush_redis() {
    let client = redis::Client::open(redis_url()).expect("Failed to connect to Redis");
    let mut conn = client.get_connection().expect("Failed to connect to Redis");
    let _: () = conn.flushdb().expect("Failed to flush Redis");
}

struct MockRetraction {
    retracted: Mutex<Vec<(String, i32)>>,
    fail_retract: bool,
}

impl MockRetraction {
    fn new(fail_retract: bool) -> Arc<Self> {
        Arc::new(MockRetraction {
            retracted: Mutex::new(Vec::new()),
            fail_retract,
        })
    }
}

#[async_trait]
impl ConfigDelivery for MockRetraction {
    async fn deliver(&self, channel: &str, _record: &ConfigRecord) -> anyhow::Result<DeliveryReceipt> {
        Ok(DeliveryReceipt {
            channel_id: channel.to_string(),
            message_id: 1,
        })
    }

    async fn retract(&self, channel: &str, message_id: i32) -> anyhow::Result<()> {
        if self.fail_retract {
            bail!("simulated delete failure");
        }
        self.retracted
            .lock()
            .unwrap()
            .push((channel.to_string(), message_id));
        Ok(())
    }
}

fn make_record(fp: &str) -> ConfigRecord {
    ConfigRecord {
        fingerprint: fp.to_string(),
        protocol: Protocol::Trojan,
        link: format!("trojan://{fp}@1.2.3.4:443#Brand"),
        original_link: format!("trojan://{fp}@1.2.3.4:443#Old"),
        original_remark: "Old".to_string(),
        server: "1.2.3.4".to_string(),
        port: 443,
        location: "🇳🇱 Netherlands".to_string(),
        ping: "88ms".to_string(),
        quality: QualityTier::Yellow,
        source: "Old".to_string(),
        delivery: None,
        bad_reports: 0,
        copy_count: 0,
        created_at: Utc::now(),
    }
}

fn seed_delivered(fp: &str) -> ConfigRepository {
    flush_redis();
    let repo = ConfigRepository::new(&redis_url()).unwrap();
    repo.init(&[]).unwrap();
    repo.upsert(&make_record(fp)).unwrap();
    repo.mark_sent(
        fp,
        &DeliveryMark {
            channel_id: "@chan".to_string(),
            message_id: 42,
            sent_at: Utc::now(),
        },
    )
    .unwrap();
    repo
}

#[tokio::test]
#[serial]
async fn retraction_happens_exactly_at_the_threshold() {
    let repo = seed_delivered("bad-1");
    let mock = MockRetraction::new(false);
    let feedback = FeedbackLoop::new(repo.clone(), mock.clone());

    for expected in 1..=4u32 {
        let outcome = feedback.report_bad("bad-1").await.unwrap();
        assert_eq!(outcome.count, expected);
        assert!(!outcome.retracted, "retracted one report early");
        assert!(repo.get_by_fingerprint("bad-1").unwrap().is_some());
        assert!(mock.retracted.lock().unwrap().is_empty());
    }

    let fifth = feedback.report_bad("bad-1").await.unwrap();
    assert_eq!(fifth.count, 5);
    assert!(fifth.retracted);
    assert!(repo.get_by_fingerprint("bad-1").unwrap().is_none());
    assert_eq!(
        *mock.retracted.lock().unwrap(),
        vec![("@chan".to_string(), 42)]
    );
}

#[tokio::test]
#[serial]
async fn pending_record_retracts_without_a_remote_delete() {
    flush_redis();
    let repo = ConfigRepository::new(&redis_url()).unwrap();
    repo.init(&[]).unwrap();
    repo.upsert(&make_record("bad-2")).unwrap();

    let mock = MockRetraction::new(false);
    let feedback = FeedbackLoop::new(repo.clone(), mock.clone());
    for _ in 0..5 {
        feedback.report_bad("bad-2").await.unwrap();
    }
    assert!(repo.get_by_fingerprint("bad-2").unwrap().is_none());
    assert!(mock.retracted.lock().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn failed_remote_delete_still_removes_the_record() {
    let repo = seed_delivered("bad-3");
    let mock = MockRetraction::new(true);
    let feedback = FeedbackLoop::new(repo.clone(), mock.clone());

    let mut last = None;
    for _ in 0..5 {
        last = Some(feedback.report_bad("bad-3").await.unwrap());
    }
    assert!(last.unwrap().retracted);
    assert!(repo.get_by_fingerprint("bad-3").unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn copy_reports_never_retract() {
    let repo = seed_delivered("copy-1");
    let mock = MockRetraction::new(false);
    let feedback = FeedbackLoop::new(repo.clone(), mock.clone());

    for _ in 0..20 {
        feedback.report_copy("copy-1").unwrap();
    }
    let stored = repo.get_by_fingerprint("copy-1").unwrap().unwrap();
    assert_eq!(stored.copy_count, 20);
    assert_eq!(stored.bad_reports, 0);
    assert!(mock.retracted.lock().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn reports_on_unknown_fingerprints_are_harmless() {
    flush_redis();
    let repo = ConfigRepository::new(&redis_url()).unwrap();
    repo.init(&[]).unwrap();

    let mock = MockRetraction::new(false);
    let feedback = FeedbackLoop::new(repo.clone(), mock.clone());
    let outcome = feedback.report_bad("ghost").await.unwrap();
    assert_eq!(outcome.count, 0);
    assert!(!outcome.retracted);
    feedback.report_copy("ghost").unwrap();
}
