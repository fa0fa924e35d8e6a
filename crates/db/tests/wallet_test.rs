//! Wallet integration tests: ramp initiation and P2P transfers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::sync::Arc;

use futures::future::join_all;
use sea_orm::DatabaseConnection;
use tokio::sync::Barrier;

use rampart_core::balance::BalanceError;
use rampart_core::settlement::Metadata;
use rampart_db::entities::sea_orm_active_enums::{RampKind, RampStatus};
use rampart_db::repositories::{InitiateRampInput, WalletError};
use rampart_db::{BalanceRepository, LedgerRepository, WalletRepository};
use rampart_shared::types::{Currency, UserId};

async fn balance_of(db: &DatabaseConnection, user_id: UserId) -> (i64, i64) {
    let row = BalanceRepository::new(db.clone())
        .find_by_user(user_id)
        .await
        .expect("Failed to read balance")
        .expect("Balance should exist");
    (row.amount, row.locked)
}

fn input(user_id: UserId, amount: i64, linked: Option<i64>) -> InitiateRampInput {
    InitiateRampInput {
        user_id,
        amount,
        currency: Currency::Inr,
        provider: "test-bank".to_string(),
        linked_bank_account_id: linked,
        metadata: Metadata::new().with("note", "integration"),
    }
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_onramp_locks_linked_account_funds() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let account = common::linked_account(&db, user, 10_000).await;
    let wallet = WalletRepository::new(db.clone());

    let row = wallet
        .initiate_onramp(input(user, 7_000, Some(account)))
        .await
        .expect("Failed to initiate");
    assert!(row.token.starts_with("onr_"));
    assert_eq!(row.kind, RampKind::Onramp);
    assert_eq!(row.status, RampStatus::Processing);
    assert_eq!(row.metadata["note"], "integration");

    let linked = BalanceRepository::new(db.clone())
        .find_linked_account(account)
        .await
        .expect("Failed to read account")
        .expect("Account should exist");
    assert_eq!((linked.amount, linked.locked), (10_000, 7_000));

    // Only 3_000 left available on the bank account.
    let err = wallet
        .initiate_onramp(input(user, 3_001, Some(account)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Balance(BalanceError::InsufficientFunds { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_offramp_requires_funds_and_linked_account() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    common::fund(&db, user, 5_000).await;
    let account = common::linked_account(&db, user, 0).await;
    let wallet = WalletRepository::new(db.clone());

    let err = wallet.initiate_offramp(input(user, 1_000, None)).await.unwrap_err();
    assert!(matches!(err, WalletError::LinkedAccountRequired));

    let stranger = common::create_user(&db).await;
    let foreign = common::linked_account(&db, stranger, 0).await;
    let err = wallet
        .initiate_offramp(input(user, 1_000, Some(foreign)))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::LinkedAccountNotFound(_)));

    let err = wallet
        .initiate_offramp(input(user, 5_001, Some(account)))
        .await
        .unwrap_err();
    assert_eq!(err.http_status_code(), 422);
    assert_eq!(balance_of(&db, user).await, (5_000, 0));

    let row = wallet
        .initiate_offramp(input(user, 5_000, Some(account)))
        .await
        .expect("Failed to initiate");
    assert!(row.token.starts_with("ofr_"));
    assert_eq!(balance_of(&db, user).await, (5_000, 5_000));
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_p2p_transfer_moves_funds_and_posts_ledger() {
    let db = common::setup().await;
    let sender = common::create_user(&db).await;
    let receiver = common::create_user(&db).await;
    common::fund(&db, sender, 1_000).await;
    let wallet = WalletRepository::new(db.clone());

    let receipt = wallet
        .p2p_transfer(sender, receiver, 300, Currency::Inr)
        .await
        .expect("Failed to transfer");
    assert_eq!(receipt.sender_balance.amount, 700);
    assert_eq!(balance_of(&db, sender).await, (700, 0));
    assert_eq!(balance_of(&db, receiver).await, (300, 0));

    let posted = LedgerRepository::new(db.clone())
        .find_by_external_ref(&format!("p2p:{}", receipt.transfer_id))
        .await
        .expect("Failed to read ledger")
        .expect("Posting should exist");
    assert_eq!(posted.transaction.id, receipt.ledger_transaction_id.into_inner());
    assert_eq!(posted.entries.len(), 2);

    let err = wallet
        .p2p_transfer(sender, receiver, 701, Currency::Inr)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Balance(BalanceError::InsufficientFunds { .. })
    ));
    assert_eq!(balance_of(&db, sender).await, (700, 0));

    let err = wallet
        .p2p_transfer(sender, sender, 1, Currency::Inr)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::SelfTransfer));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_opposite_transfers_do_not_deadlock() {
    let db = common::setup().await;
    let alice = common::create_user(&db).await;
    let bob = common::create_user(&db).await;
    common::fund(&db, alice, 10_000).await;
    common::fund(&db, bob, 10_000).await;

    let wallet = WalletRepository::new(db.clone());
    let barrier = Arc::new(Barrier::new(20));
    let handles = (0..20).map(|i| {
        let wallet = wallet.clone();
        let barrier = Arc::clone(&barrier);
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        tokio::spawn(async move {
            barrier.wait().await;
            wallet.p2p_transfer(from, to, 100, Currency::Inr).await
        })
    });

    for result in join_all(handles).await {
        result.expect("Task panicked").expect("Transfer failed");
    }

    // Ten each way: net zero.
    assert_eq!(balance_of(&db, alice).await, (10_000, 0));
    assert_eq!(balance_of(&db, bob).await, (10_000, 0));
}

#[tokio::test]
#[ignore = "requires Postgres; run with --ignored"]
async fn test_request_currency_must_match_stored_rows() {
    let db = common::setup().await;
    let user = common::create_user(&db).await;
    let receiver = common::create_user(&db).await;
    common::fund(&db, user, 1_000).await;
    let account = common::linked_account(&db, user, 1_000).await;
    let wallet = WalletRepository::new(db.clone());

    let usd = |amount, linked| InitiateRampInput {
        currency: Currency::Usd,
        ..input(user, amount, linked)
    };

    let err = wallet.initiate_offramp(usd(600, Some(account))).await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::Balance(BalanceError::CurrencyMismatch { .. })
    ));
    assert_eq!(err.http_status_code(), 422);
    assert_eq!(balance_of(&db, user).await, (1_000, 0));

    let err = wallet.initiate_onramp(usd(600, Some(account))).await.unwrap_err();
    assert_eq!(err.error_code(), "CURRENCY_MISMATCH");
    let linked = BalanceRepository::new(db.clone())
        .find_linked_account(account)
        .await
        .expect("Failed to read account")
        .expect("Account should exist");
    assert_eq!((linked.amount, linked.locked), (1_000, 0));

    let err = wallet
        .p2p_transfer(user, receiver, 600, Currency::Usd)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::Balance(BalanceError::CurrencyMismatch { .. })
    ));
    assert_eq!(balance_of(&db, user).await, (1_000, 0));

    // A user funded in USD cannot receive INR either.
    common::fund_in(&db, receiver, 50, Currency::Usd).await;
    let err = wallet
        .p2p_transfer(user, receiver, 10, Currency::Inr)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CURRENCY_MISMATCH");
    assert_eq!(balance_of(&db, receiver).await, (50, 0));
}
