//! Concurrent redemption of one payment.

use super::TestHarness;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tollgate::{AuditLog, Error};

const CONTENDERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unlocks_have_one_winner() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(40);
    harness.publish_paid("analysis", "Full analysis text", &sig);
    // Slow ledger so every contender is in flight at once.
    harness.oracle.set_delay(Some(Duration::from_millis(50)));

    let attempts = (0..CONTENDERS).map(|_| {
        let gate = Arc::clone(&harness.gate);
        let sig = sig.clone();
        tokio::spawn(async move {
            gate.unlock(&sig, "analysis", &TestHarness::buyer())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let replays = results
        .iter()
        .filter(|r| matches!(r, Err(Error::ReplayDetected)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(replays, CONTENDERS - 1);

    let stats = harness.audit.stats();
    assert_eq!(stats.unlocked, 1);
    assert_eq!(stats.total, CONTENDERS);
    assert_eq!(harness.gate.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_signatures_proceed_in_parallel() {
    let harness = TestHarness::setup();
    let signatures: Vec<String> = (50..58).map(TestHarness::signature).collect();
    for (i, sig) in signatures.iter().enumerate() {
        harness.publish_paid(&format!("item-{i}"), &format!("body {i}"), sig);
    }
    harness.oracle.set_delay(Some(Duration::from_millis(200)));

    let started = std::time::Instant::now();
    let attempts = signatures.iter().enumerate().map(|(i, sig)| {
        let gate = Arc::clone(&harness.gate);
        let sig = sig.clone();
        tokio::spawn(async move {
            gate.unlock(&sig, &format!("item-{i}"), &TestHarness::buyer())
                .await
        })
    });
    let results = join_all(attempts).await;

    for (i, joined) in results.into_iter().enumerate() {
        assert_eq!(joined.unwrap().unwrap(), format!("body {i}").into_bytes());
    }
    // Serialized lookups would take 8 x 200ms.
    assert!(started.elapsed() < Duration::from_millis(1_200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wrong_content_does_not_steal_redemption() {
    let harness = TestHarness::setup();
    let sig_a = TestHarness::signature(60);
    harness.publish_paid("for-a", "content for a", &sig_a);
    harness.publish("for-b", "content for b", &TestHarness::signature(61));

    let wrong = {
        let gate = Arc::clone(&harness.gate);
        let sig = sig_a.clone();
        tokio::spawn(async move { gate.unlock(&sig, "for-b", &TestHarness::buyer()).await })
    };
    let right = {
        let gate = Arc::clone(&harness.gate);
        let sig = sig_a.clone();
        tokio::spawn(async move { gate.unlock(&sig, "for-a", &TestHarness::buyer()).await })
    };

    assert!(matches!(wrong.await.unwrap(), Err(Error::DecryptionFailed)));
    assert_eq!(right.await.unwrap().unwrap(), b"content for a");
    assert!(harness.gate.is_used(&sig_a));
}
