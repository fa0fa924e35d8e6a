//! Settlement repository: drives a webhook through the claim engine.
//!
//! One database transaction per webhook:
//! 1. fetch the transaction by `(token, kind)` and evaluate the guards
//! 2. claim it with a conditional `UPDATE` (zero rows means a concurrent
//!    claim won)
//! 3. lock and mutate balances in lock order
//! 4. post the ledger transaction
//!
//! Nothing is visible to other sessions until the commit.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{BinOper, Expr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait, UpdateMany,
};
use uuid::Uuid;
use tracing::{error, info, warn};

use rampart_core::balance::{BalanceError, BalanceSnapshot, LockKey};
use rampart_core::ledger::{LedgerError, LedgerTransactionType, PostingRequest};
use rampart_core::settlement::{
    BANK_TIMEOUT, ClaimFrom, ClaimOutcome, ClaimPlan, ClaimRejection, Metadata, RampKind,
    TransactionSnapshot, TxnStatus, WebhookPayload, evaluate,
};
use rampart_shared::types::{Currency, LedgerTransactionId, UserId};

use super::balance::{apply_op, ensure_balance, lock_rows};
use super::ledger::{ensure_platform_clearing_account, ensure_user_cash_account, post_in};
use crate::entities::{
    ramp_transactions,
    sea_orm_active_enums::{RampKind as DbRampKind, RampStatus},
};

/// Error types for settlement.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Ledger posting failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Balance mutation failed.
    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// The stored transaction row cannot be interpreted.
    #[error("Corrupt transaction row: {0}")]
    CorruptRow(String),

    /// The settlement transaction exceeded its time budget and was rolled back.
    #[error("Settlement timed out after {0:?}")]
    Timeout(Duration),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl SettlementError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.error_code(),
            Self::Balance(e) => e.error_code(),
            Self::CorruptRow(_) => "CORRUPT_TRANSACTION",
            Self::Timeout(_) => "SETTLEMENT_TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns true if the error means the books would have been corrupted.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_invariant_violation(),
            Self::Balance(e) => e.is_invariant_violation(),
            Self::CorruptRow(_) => true,
            Self::Timeout(_) | Self::Database(_) => false,
        }
    }
}

/// Settlement repository.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    db: DatabaseConnection,
    max_wait: Duration,
    timeout: Duration,
}

impl SettlementRepository {
    /// Creates a new settlement repository.
    ///
    /// `max_wait` bounds how long to wait for a connection to open the
    /// transaction; `timeout` bounds the transaction itself.
    #[must_use]
    pub const fn new(db: DatabaseConnection, max_wait: Duration, timeout: Duration) -> Self {
        Self {
            db,
            max_wait,
            timeout,
        }
    }

    /// Settles one webhook delivery.
    ///
    /// Rejections are returned as `Ok(ClaimOutcome::Rejected(..))`; they
    /// never mutate anything.
    ///
    /// # Errors
    ///
    /// Any error means the database transaction was rolled back.
    pub async fn settle(
        &self,
        payload: &WebhookPayload,
        webhook_event_id: Option<&str>,
    ) -> Result<ClaimOutcome, SettlementError> {
        let txn = tokio::time::timeout(self.max_wait, self.db.begin())
            .await
            .map_err(|_| SettlementError::Timeout(self.max_wait))??;

        let result =
            tokio::time::timeout(self.timeout, settle_in(&txn, payload, webhook_event_id)).await;

        match result {
            Ok(Ok(outcome)) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Ok(Err(e)) => {
                if e.is_invariant_violation() {
                    error!(
                        target: "settlement",
                        token = %payload.token,
                        error = %e,
                        "Settlement aborted on invariant violation"
                    );
                }
                rollback(txn, &payload.token).await;
                Err(e)
            }
            Err(_) => {
                warn!(
                    target: "settlement",
                    token = %payload.token,
                    timeout = ?self.timeout,
                    "Settlement timed out"
                );
                rollback(txn, &payload.token).await;
                Err(SettlementError::Timeout(self.timeout))
            }
        }
    }

    /// Finds a transaction by token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<ramp_transactions::Model>, DbErr> {
        ramp_transactions::Entity::find()
            .filter(ramp_transactions::Column::Token.eq(token))
            .one(&self.db)
            .await
    }
}

async fn rollback(txn: DatabaseTransaction, token: &str) {
    if let Err(e) = txn.rollback().await {
        warn!(target: "settlement", token = %token, error = %e, "Rollback failed");
    }
}

async fn settle_in(
    txn: &DatabaseTransaction,
    payload: &WebhookPayload,
    webhook_event_id: Option<&str>,
) -> Result<ClaimOutcome, SettlementError> {
    let row = ramp_transactions::Entity::find()
        .filter(ramp_transactions::Column::Token.eq(&payload.token))
        .filter(ramp_transactions::Column::Kind.eq(DbRampKind::from(payload.kind)))
        .one(txn)
        .await?;

    let Some(row) = row else {
        return Ok(ClaimOutcome::Rejected(ClaimRejection::NotFound));
    };

    let plan = match evaluate(Some(&snapshot_of(&row)), payload) {
        Ok(plan) => plan,
        Err(rejection) => return Ok(ClaimOutcome::Rejected(rejection)),
    };

    if !claim(txn, &row, payload, &plan, webhook_event_id).await? {
        info!(
            target: "settlement",
            token = %row.token,
            status = plan.to.as_str(),
            "Claim lost to a concurrent delivery"
        );
        return Ok(ClaimOutcome::Rejected(ClaimRejection::AlreadyProcessed));
    }

    let currency = row
        .currency
        .parse::<Currency>()
        .map_err(SettlementError::CorruptRow)?;
    let user_id = UserId::from_uuid(row.user_id);

    let balance_after = apply_effects(txn, &row, &plan, user_id, currency).await?;

    let outcome = match plan.to {
        TxnStatus::Success => {
            let ledger_transaction_id =
                post_settlement(txn, &row, user_id, currency).await?;
            let balance = balance_after.ok_or_else(|| {
                BalanceError::NotFound(format!("balance for user {user_id}"))
            })?;
            ClaimOutcome::ProcessedSuccess {
                ledger_transaction_id,
                balance,
            }
        }
        TxnStatus::Failure | TxnStatus::Processing => ClaimOutcome::ProcessedFailure {
            funds_released: plan.effects.releases_funds(),
        },
    };

    info!(
        target: "settlement",
        token = %row.token,
        kind = row_kind(&row).as_str(),
        outcome = outcome.as_str(),
        timeout_override = plan.timeout_override,
        "Transaction settled"
    );

    Ok(outcome)
}

fn snapshot_of(row: &ramp_transactions::Model) -> TransactionSnapshot {
    TransactionSnapshot {
        token: row.token.clone(),
        kind: row_kind(row),
        user_id: UserId::from_uuid(row.user_id),
        amount: row.amount,
        status: row.status.into(),
        failure_reason_code: row.failure_reason_code.clone(),
        linked_bank_account_id: row.linked_bank_account_id,
    }
}

fn row_kind(row: &ramp_transactions::Model) -> RampKind {
    row.kind.into()
}

/// Conditional status update. Returns false if zero rows matched.
async fn claim(
    txn: &DatabaseTransaction,
    row: &ramp_transactions::Model,
    payload: &WebhookPayload,
    plan: &ClaimPlan,
    webhook_event_id: Option<&str>,
) -> Result<bool, SettlementError> {
    let now = Utc::now();
    let overlay = Metadata::settlement(payload, plan.to, webhook_event_id, now, plan.timeout_override);

    let result = claim_statement(&row.token, row.user_id, plan, overlay, now)
        .exec(txn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Builds the claim `UPDATE`. Metadata is merged with jsonb `||` so keys
/// written by an earlier claim survive.
fn claim_statement(
    token: &str,
    user_id: Uuid,
    plan: &ClaimPlan,
    overlay: Metadata,
    now: DateTime<Utc>,
) -> UpdateMany<ramp_transactions::Entity> {
    let changes = ramp_transactions::ActiveModel {
        status: Set(plan.to.into()),
        failure_reason_code: Set(plan.failure_reason_code.clone()),
        failure_reason_message: Set(plan.failure_reason_message.clone()),
        completed_at: Set(Some(now.into())),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let from = match plan.from {
        ClaimFrom::Processing => {
            Condition::all().add(ramp_transactions::Column::Status.eq(RampStatus::Processing))
        }
        ClaimFrom::ProcessingOrTimedOut => Condition::any()
            .add(ramp_transactions::Column::Status.eq(RampStatus::Processing))
            .add(
                Condition::all()
                    .add(ramp_transactions::Column::Status.eq(RampStatus::Failure))
                    .add(ramp_transactions::Column::FailureReasonCode.eq(BANK_TIMEOUT)),
            ),
    };

    ramp_transactions::Entity::update_many()
        .set(changes)
        .col_expr(
            ramp_transactions::Column::Metadata,
            Expr::col(ramp_transactions::Column::Metadata)
                .binary(BinOper::Custom("||"), Expr::val(overlay.into_value())),
        )
        .filter(ramp_transactions::Column::Token.eq(token))
        .filter(ramp_transactions::Column::UserId.eq(user_id))
        .filter(from)
}

/// Locks and mutates the rows named by the plan's effects.
///
/// Returns the user's balance after the mutation when it was touched.
async fn apply_effects(
    txn: &DatabaseTransaction,
    row: &ramp_transactions::Model,
    plan: &ClaimPlan,
    user_id: UserId,
    currency: Currency,
) -> Result<Option<BalanceSnapshot>, SettlementError> {
    let effects = plan.effects;

    let balance_key = match effects.balance {
        Some(_) => Some(LockKey::balance(ensure_balance(txn, user_id, currency).await?)),
        None => None,
    };
    let linked_key = match (effects.linked_account, row.linked_bank_account_id) {
        (Some(_), Some(id)) => Some(LockKey::linked_account(id)),
        _ => None,
    };

    let locked = lock_rows(txn, balance_key.into_iter().chain(linked_key)).await?;

    let current = |key: LockKey| {
        locked
            .get(&key)
            .copied()
            .ok_or_else(|| BalanceError::NotFound(format!("locked row {key:?}")))
    };

    let mut balance_after = None;
    if let (Some(key), Some(op)) = (balance_key, effects.balance) {
        balance_after = Some(apply_op(txn, key, current(key)?, op).await?);
    }
    if let (Some(key), Some(op)) = (linked_key, effects.linked_account) {
        apply_op(txn, key, current(key)?, op).await?;
    }

    Ok(balance_after)
}

/// Posts the settlement's ledger transaction under `<kind>:<token>`.
async fn post_settlement(
    txn: &DatabaseTransaction,
    row: &ramp_transactions::Model,
    user_id: UserId,
    currency: Currency,
) -> Result<LedgerTransactionId, SettlementError> {
    let user_cash = ensure_user_cash_account(txn, user_id, currency).await?;
    let clearing = ensure_platform_clearing_account(txn, currency).await?;

    let request = match row_kind(row) {
        RampKind::Onramp => PostingRequest::transfer(
            LedgerTransactionType::Onramp,
            &row.token,
            clearing,
            user_cash,
            row.amount,
            currency,
        )?,
        RampKind::Offramp => PostingRequest::transfer(
            LedgerTransactionType::Offramp,
            &row.token,
            user_cash,
            clearing,
            row.amount,
            currency,
        )?,
    };

    Ok(post_in(txn, &request).await?.id)
}
