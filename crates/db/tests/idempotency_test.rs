//! Idempotency cache integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use rampart_db::IdempotencyRepository;
use rampart_db::repositories::{IdempotencyError, Reservation};

fn key() -> String {
    format!("idem-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_completed_key_replays_stored_response() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let repo = IdempotencyRepository::new(db.clone(), Duration::from_secs(3600));
    let key = key();

    assert_eq!(
        repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve"),
        Reservation::Fresh
    );

    let err = repo.reserve(&key, user, "wallet.p2p").await.unwrap_err();
    assert!(matches!(err, IdempotencyError::InFlight));

    let body = json!({ "transferId": "abc", "amount": 100 });
    repo.complete(&key, 201, &body).await.expect("Failed to complete");

    assert_eq!(
        repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve"),
        Reservation::Replay { status: 201, body }
    );
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_key_is_scoped_to_user_and_action() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let other = common::create_user(&db).await;
    let repo = IdempotencyRepository::new(db.clone(), Duration::from_secs(3600));
    let key = key();

    repo.reserve(&key, user, "wallet.onramp").await.expect("Failed to reserve");

    let err = repo.reserve(&key, other, "wallet.onramp").await.unwrap_err();
    assert!(matches!(err, IdempotencyError::KeyMismatch));

    let err = repo.reserve(&key, user, "wallet.offramp").await.unwrap_err();
    assert!(matches!(err, IdempotencyError::KeyMismatch));
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_released_key_can_be_retried() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let repo = IdempotencyRepository::new(db.clone(), Duration::from_secs(3600));
    let key = key();

    repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve");
    repo.release(&key).await.expect("Failed to release");

    assert_eq!(
        repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve"),
        Reservation::Fresh
    );

    // Completed keys survive a release.
    repo.complete(&key, 200, &json!({})).await.expect("Failed to complete");
    repo.release(&key).await.expect("Failed to release");
    assert!(matches!(
        repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve"),
        Reservation::Replay { status: 200, .. }
    ));
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_expired_key_is_reclaimed() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let repo = IdempotencyRepository::new(db.clone(), Duration::ZERO);
    let key = key();

    repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve");
    repo.complete(&key, 201, &json!({ "stale": true }))
        .await
        .expect("Failed to complete");

    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(
        repo.reserve(&key, user, "wallet.p2p").await.expect("Failed to reserve"),
        Reservation::Fresh
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(repo.purge_expired().await.expect("Failed to purge") >= 1);
}
