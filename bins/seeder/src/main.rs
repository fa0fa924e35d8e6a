//! Database seeder for Rampart development and testing.
//!
//! Seeds two wallet users with balances and linked bank accounts, then opens
//! one pending on-ramp and one pending off-ramp so the webhook endpoint has
//! something to settle.
//!
//! Usage: cargo run --bin seeder

use std::error::Error;

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::json;

use rampart_core::balance::{BalanceOp, LockKey};
use rampart_core::settlement::{Metadata, RampKind};
use rampart_db::repositories::InitiateRampInput;
use rampart_db::repositories::balance::{ensure_balance, lock_and_apply};
use rampart_db::{UserRepository, WalletRepository};
use rampart_shared::types::{Currency, UserId};

/// Demo users: `(email, full name, opening wallet balance, linked account funds)`.
const USERS: [(&str, &str, i64, i64); 2] = [
    ("alice@rampart.dev", "Alice Demo", 100_000, 500_000),
    ("bob@rampart.dev", "Bob Demo", 25_000, 100_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("RAMPART__DATABASE__URL"))
        .map_err(|_| "DATABASE_URL must be set in environment")?;

    println!("Connecting to database...");
    let db = rampart_db::connect(&database_url).await?;

    println!("Seeding users...");
    let mut seeded = Vec::new();
    for (email, name, balance, linked_funds) in USERS {
        if let Some(user) = seed_user(&db, email, name, balance, linked_funds).await? {
            seeded.push(user);
        }
    }

    let Some(&(alice, account_id)) = seeded.first() else {
        println!("Users already seeded, nothing to do.");
        return Ok(());
    };

    println!("Opening pending ramp transactions...");
    let wallet = WalletRepository::new(db.clone());
    for kind in [RampKind::Onramp, RampKind::Offramp] {
        let input = InitiateRampInput {
            user_id: alice,
            amount: 10_000,
            currency: Currency::Inr,
            provider: "demo-bank".to_string(),
            linked_bank_account_id: Some(account_id),
            metadata: Metadata::new().with("source", "seeder"),
        };
        let row = match kind {
            RampKind::Onramp => wallet.initiate_onramp(input).await?,
            RampKind::Offramp => wallet.initiate_offramp(input).await?,
        };

        let mut sample = json!({
            "type": kind,
            "token": row.token,
            "user_identifier": alice,
            "amount": row.amount,
            "status": "Success",
        });
        if kind == RampKind::Offramp {
            sample["linkedBankAccountId"] = json!(account_id);
        }
        println!("  {kind} {} pending; sample webhook body:", row.token);
        println!("    {sample}");
    }

    println!("Seeding complete!");
    Ok(())
}

/// Creates a user with a funded balance and a linked account.
///
/// Returns `None` when the email already exists.
async fn seed_user(
    db: &DatabaseConnection,
    email: &str,
    name: &str,
    balance: i64,
    linked_funds: i64,
) -> Result<Option<(UserId, i64)>, Box<dyn Error>> {
    let users = UserRepository::new(db.clone());

    if users.email_exists(email).await? {
        println!("  {email} already exists, skipping...");
        return Ok(None);
    }

    let user_id = UserId::from_uuid(users.create(email, name).await?.id);
    let account = users
        .create_linked_account(user_id, "Demo Bank", "4242", Currency::Inr, linked_funds)
        .await?;

    let txn = db.begin().await?;
    let balance_id = ensure_balance(&txn, user_id, Currency::Inr).await?;
    lock_and_apply(&txn, LockKey::balance(balance_id), BalanceOp::Credit(balance)).await?;
    txn.commit().await?;

    println!("  Created {email} ({user_id}) with balance {balance} and linked account {}", account.id);
    Ok(Some((user_id, account.id)))
}
