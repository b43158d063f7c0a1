//! Audit log contents after real gate traffic.

use super::TestHarness;
use chrono::Utc;
use tollgate::{AuditLog, AuditOutcome, GateEvent, Lamports, RejectionReason};

#[tokio::test]
async fn test_one_entry_per_attempt_and_chain_holds() {
    let harness = TestHarness::setup();
    let buyer = TestHarness::buyer();
    let paid = TestHarness::signature(70);
    let cheap = TestHarness::signature(71);

    harness.publish_paid("analysis", "line1\nline2", &paid);
    harness.publish("cheap", "text", &cheap);
    harness.pay(&cheap, Lamports::new(1));

    harness.gate.preview("analysis").unwrap();
    harness.gate.unlock(&paid, "analysis", &buyer).await.unwrap();
    harness.gate.unlock(&paid, "analysis", &buyer).await.unwrap_err();
    harness.gate.unlock(&cheap, "cheap", &buyer).await.unwrap_err();
    harness.gate.unlock("bad", "cheap", &buyer).await.unwrap_err();

    let entries = harness.audit.all();
    let outcomes: Vec<AuditOutcome> = entries.iter().map(|e| e.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AuditOutcome::PreviewServed,
            AuditOutcome::Unlocked,
            AuditOutcome::ReplayDetected,
            AuditOutcome::PaymentRejected(RejectionReason::AmountTooLow),
            AuditOutcome::MalformedInput,
        ]
    );
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64);
    }
    harness.audit.verify_chain().unwrap();

    let unlocked = harness.audit.query(&paid).unwrap();
    assert_eq!(unlocked.outcome, AuditOutcome::Unlocked);
    assert_eq!(unlocked.content_id, "analysis");
    assert_eq!(unlocked.sender_address.as_deref(), Some(buyer.as_str()));
    assert_eq!(unlocked.amount, Some(super::harness::PRICE));

    // An underpayment still records what the ledger says was paid.
    let underpaid = harness.audit.query(&cheap).unwrap();
    assert_eq!(underpaid.amount, Some(Lamports::new(1)));
}

#[tokio::test]
async fn test_tampering_breaks_chain() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(72);
    harness.publish_paid("analysis", "text", &sig);
    harness.gate.preview("analysis").unwrap();
    harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();

    let mut entries = harness.audit.all();
    entries[1].content_id = "something-else".to_string();
    let recomputed = entries[1].compute_hash(&entries[1].prev_hash).unwrap();
    assert_ne!(recomputed, entries[1].entry_hash);
}

#[tokio::test]
async fn test_pruning_keeps_replay_protection() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(73);
    harness.publish_paid("analysis", "text", &sig);
    harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();

    let (audit_entries, redemptions) =
        harness.prune_before(Utc::now() + chrono::Duration::seconds(1));
    assert_eq!(audit_entries, 1);
    assert_eq!(redemptions, 1);
    assert!(harness.audit.is_empty());
    assert_eq!(harness.replay.detail_count(), 0);

    // Details are gone but the signature stays spent.
    assert!(harness.gate.is_used(&sig));
    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, tollgate::Error::ReplayDetected));
    harness.audit.verify_chain().unwrap();
}

#[tokio::test]
async fn test_gate_prune_respects_retention() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(74);
    harness.publish_paid("analysis", "text", &sig);
    harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();

    // Everything is fresh, nothing is past the default retention window.
    assert_eq!(harness.gate.prune(), (0, 0));
    assert_eq!(harness.audit.len(), 1);
}

#[tokio::test]
async fn test_events_follow_traffic() {
    let harness = TestHarness::setup();
    let mut events = harness.gate.subscribe_events();
    let sig = TestHarness::signature(75);

    harness.publish_paid("analysis", "text", &sig);
    harness.gate.preview("analysis").unwrap();
    harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            GateEvent::ContentPublished {
                content_id: "analysis".to_string()
            },
            GateEvent::PreviewServed {
                content_id: "analysis".to_string()
            },
            GateEvent::ContentUnlocked {
                content_id: "analysis".to_string()
            },
        ]
    );
}
