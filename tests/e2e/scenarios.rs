//! Unlock flows through the whole gate.

use super::harness::PRICE;
use super::{HarnessOptions, TestHarness};
use chrono::Utc;
use std::time::Duration;
use tollgate::payment::{PaymentPolicy, PaymentValidatorConfig};
use tollgate::{
    AuditLog, AuditOutcome, ContentCipher, Error, Lamports, PaymentClaim, PaymentValidator,
    RejectionReason, ServerSecret, TransactionOracle, TransactionRecord,
};

#[tokio::test]
async fn test_exact_payment_verifies() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(1);
    harness.pay(&sig, Lamports::from_sol_str("0.001").unwrap());

    let verdict = harness
        .gate
        .verify_payment(&sig, "analysis", &TestHarness::buyer())
        .await;
    assert!(verdict.is_verified());
    assert!(!harness.gate.is_used(&sig));
}

#[tokio::test]
async fn test_underpayment_rejected() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(2);
    harness.publish("analysis", "Full analysis text", &sig);
    harness.pay(&sig, Lamports::from_sol_str("0.0005").unwrap());

    let verdict = harness
        .gate
        .verify_payment(&sig, "analysis", &TestHarness::buyer())
        .await;
    assert_eq!(verdict.rejection(), Some(RejectionReason::AmountTooLow));

    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PaymentUnverified(RejectionReason::AmountTooLow)
    ));
    assert_eq!(err.status_code(), 402);
}

#[test]
fn test_cipher_round_trip_and_wrong_signature() {
    let cipher = ContentCipher::new(ServerSecret::from_bytes(vec![7; 32]).unwrap());
    let sig_a = TestHarness::signature(3);
    let sig_b = TestHarness::signature(4);

    let sealed = cipher.encrypt(b"hello world", &sig_a).unwrap();
    assert_eq!(cipher.decrypt(&sealed, &sig_a).unwrap(), b"hello world");
    assert!(matches!(
        cipher.decrypt(&sealed, &sig_b),
        Err(Error::DecryptionFailed)
    ));
}

#[tokio::test]
async fn test_second_unlock_is_replay() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(5);
    harness.publish_paid("analysis", "Full analysis text", &sig);

    let plaintext = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();
    assert_eq!(plaintext, b"Full analysis text");
    assert!(harness.gate.is_used(&sig));

    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReplayDetected));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_replay_wins_even_if_ledger_disappears() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(6);
    harness.publish_paid("analysis", "text", &sig);
    harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap();

    harness.oracle.set_unavailable(true);
    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReplayDetected));
}

#[tokio::test]
async fn test_preview_of_published_content() {
    let harness = TestHarness::setup();
    harness.publish(
        "analysis",
        "line1\nline2\nline3\nline4",
        &TestHarness::signature(7),
    );

    let preview = harness.gate.preview("analysis").unwrap();
    assert!(preview.contains("line1"));
    assert!(preview.contains("line2"));
    assert!(!preview.contains("line3"));
    assert!(!preview.contains("line4"));
    assert!(preview.contains("0.001 SOL"));
    assert!(preview.contains(&TestHarness::recipient()));
}

#[tokio::test]
async fn test_preview_hides_everything_at_zero_fraction() {
    let harness = TestHarness::with_options(HarnessOptions {
        preview_fraction: 0.0,
        ..HarnessOptions::default()
    });
    harness.publish("analysis", "secret line", &TestHarness::signature(8));

    let preview = harness.gate.preview("analysis").unwrap();
    assert!(!preview.contains("secret line"));
    assert!(preview.contains(&harness.gate.redactor().payment_instructions()));
}

#[tokio::test]
async fn test_key_mismatch_keeps_signature_redeemable() {
    let harness = TestHarness::setup();
    let sig_a = TestHarness::signature(9);
    let sig_b = TestHarness::signature(10);
    harness.publish_paid("for-a", "content for a", &sig_a);
    harness.publish("for-b", "content for b", &sig_b);

    let err = harness
        .gate
        .unlock(&sig_a, "for-b", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DecryptionFailed));
    assert!(!harness.gate.is_used(&sig_a));

    let plaintext = harness
        .gate
        .unlock(&sig_a, "for-a", &TestHarness::buyer())
        .await
        .unwrap();
    assert_eq!(plaintext, b"content for a");
}

#[tokio::test]
async fn test_ledger_rejections() {
    let harness = TestHarness::setup();
    let buyer = TestHarness::buyer();

    let cases = [
        (11, None, RejectionReason::TransactionNotFound),
        (
            12,
            Some(TransactionRecord {
                confirmed: false,
                ..TestHarness::transfer(PRICE)
            }),
            RejectionReason::TransactionUnconfirmed,
        ),
        (
            13,
            Some(TransactionRecord {
                recipient: TestHarness::address(99),
                ..TestHarness::transfer(PRICE)
            }),
            RejectionReason::RecipientMismatch,
        ),
        (
            14,
            Some(TransactionRecord {
                sender: TestHarness::address(98),
                ..TestHarness::transfer(PRICE)
            }),
            RejectionReason::SenderMismatch,
        ),
        (
            15,
            Some(TransactionRecord {
                timestamp: Some(Utc::now() - chrono::Duration::days(3)),
                ..TestHarness::transfer(PRICE)
            }),
            RejectionReason::PaymentExpired,
        ),
    ];

    for (seed, record, expected) in cases {
        let sig = TestHarness::signature(seed);
        if let Some(record) = record {
            harness.pay_with(&sig, record);
        }

        let verdict = harness.gate.verify_payment(&sig, "content", &buyer).await;
        assert_eq!(verdict.rejection(), Some(expected), "seed {seed}");
        assert!(!harness.gate.is_used(&sig));
    }
}

#[tokio::test]
async fn test_overpayment_accepted() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(16);
    harness.publish("analysis", "text", &sig);
    harness.pay(&sig, Lamports::new(PRICE.get() * 10));

    assert!(harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_malformed_requests_never_reach_ledger() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(17);

    for (signature, content_id, sender) in [
        ("0OIl", "analysis", TestHarness::buyer()),
        (sig.as_str(), "../etc/passwd", TestHarness::buyer()),
        (sig.as_str(), "analysis", "not-an-address".to_string()),
        ("", "analysis", TestHarness::buyer()),
    ] {
        let err = harness
            .gate
            .unlock(signature, content_id, &sender)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert_eq!(err.status_code(), 400);
    }
    assert_eq!(harness.oracle.lookup_count(), 0);
    assert_eq!(harness.audit.stats().rejected, 4);
}

#[tokio::test]
async fn test_upstream_timeout_fails_closed() {
    let harness = TestHarness::with_options(HarnessOptions {
        query_timeout_secs: 1,
        max_retries: 0,
        ..HarnessOptions::default()
    });
    let sig = TestHarness::signature(18);
    harness.publish_paid("analysis", "text", &sig);
    harness.oracle.set_delay(Some(Duration::from_secs(3)));

    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    assert_eq!(err.status_code(), 503);
    assert!(!harness.gate.is_used(&sig));
    assert_eq!(
        harness.audit.query(&sig).unwrap().outcome,
        AuditOutcome::PaymentRejected(RejectionReason::UpstreamUnavailable)
    );

    // Once the ledger answers again the same payment still works.
    harness.oracle.set_delay(None);
    assert!(harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_upstream_outage_is_retried() {
    let harness = TestHarness::with_options(HarnessOptions {
        max_retries: 2,
        ..HarnessOptions::default()
    });
    let sig = TestHarness::signature(19);
    harness.publish_paid("analysis", "text", &sig);
    harness.oracle.set_unavailable(true);

    let err = harness
        .gate
        .unlock(&sig, "analysis", &TestHarness::buyer())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    assert_eq!(harness.oracle.lookup_count(), 3);
}

#[tokio::test]
async fn test_validator_used_directly() {
    let harness = TestHarness::setup();
    let sig = TestHarness::signature(20);
    harness.pay(&sig, PRICE);

    let policy = PaymentPolicy {
        required_amount: PRICE,
        recipient_address: TestHarness::recipient(),
    };
    let oracle: std::sync::Arc<dyn TransactionOracle> = harness.oracle.clone();
    let validator = PaymentValidator::new(PaymentValidatorConfig::default(), oracle);
    let claim = PaymentClaim::new(&policy, &sig, "analysis", TestHarness::buyer());

    assert!(validator.verify_payment(&claim).await.is_verified());
    assert!(validator.verify_payment(&claim).await.is_verified());
    // The second check is served from the cache.
    assert_eq!(harness.oracle.lookup_count(), 1);
    assert_eq!(validator.cache_stats().hits, 1);
}
