//! Wallet repository: on-ramp/off-ramp initiation and P2P transfers.
//!
//! Initiation creates the `Processing` row that a webhook later settles and
//! reserves the funds the settlement will consume.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use rampart_core::balance::{BalanceError, BalanceOp, BalanceSnapshot, LockKey};
use rampart_core::ledger::{LedgerError, LedgerTransactionType, PostingRequest};
use rampart_core::settlement::{Metadata, RampKind, TxnStatus};
use rampart_shared::types::{
    Currency, LedgerTransactionId, RampTransactionId, TransferId, UserId,
};

use super::balance::{apply_op, ensure_balance, ensure_currency, lock_and_apply, lock_rows};
use super::ledger::{ensure_user_cash_account, post_in};
use crate::entities::{
    linked_bank_accounts, p2p_transfers, ramp_transactions,
    sea_orm_active_enums::RampKind as DbRampKind, users,
};

/// Error types for wallet operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Linked bank account not found or not owned by the user.
    #[error("Linked bank account not found: {0}")]
    LinkedAccountNotFound(i64),

    /// Off-ramp without a destination account.
    #[error("A linked bank account is required for off-ramp")]
    LinkedAccountRequired,

    /// Sender and receiver are the same user.
    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    /// Provider name is blank.
    #[error("Provider is required")]
    MissingProvider,

    /// Balance check or mutation failed.
    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// Ledger posting failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl WalletError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::LinkedAccountNotFound(_) => "LINKED_ACCOUNT_NOT_FOUND",
            Self::LinkedAccountRequired => "LINKED_ACCOUNT_REQUIRED",
            Self::SelfTransfer => "SELF_TRANSFER",
            Self::MissingProvider => "MISSING_PROVIDER",
            Self::Balance(e) => e.error_code(),
            Self::Ledger(e) => e.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::UserNotFound(_) | Self::LinkedAccountNotFound(_) => 404,
            Self::LinkedAccountRequired | Self::SelfTransfer | Self::MissingProvider => 400,
            Self::Balance(e) => e.http_status_code(),
            Self::Ledger(e) => e.http_status_code(),
            Self::Database(_) => 500,
        }
    }
}

/// Input for initiating an on-ramp or off-ramp transaction.
#[derive(Debug, Clone)]
pub struct InitiateRampInput {
    /// Owning user.
    pub user_id: UserId,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency.
    pub currency: Currency,
    /// Payment provider name.
    pub provider: String,
    /// Linked bank account (required for off-ramp).
    pub linked_bank_account_id: Option<i64>,
    /// Client-supplied metadata.
    pub metadata: Metadata,
}

/// A completed P2P transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Transfer id.
    pub transfer_id: TransferId,
    /// Ledger transaction `p2p:<transfer_id>`.
    pub ledger_transaction_id: LedgerTransactionId,
    /// Sender balance after the transfer.
    pub sender_balance: BalanceSnapshot,
}

/// Wallet repository.
#[derive(Debug, Clone)]
pub struct WalletRepository {
    db: DatabaseConnection,
}

impl WalletRepository {
    /// Creates a new wallet repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a `Processing` on-ramp transaction.
    ///
    /// When a linked bank account is attached, the deposit amount is locked
    /// on it until the webhook settles.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the linked account cannot cover the
    /// amount, or a not-found error for unknown user or account.
    pub async fn initiate_onramp(
        &self,
        input: InitiateRampInput,
    ) -> Result<ramp_transactions::Model, WalletError> {
        let txn = self.db.begin().await?;

        self.prepare(&txn, &input).await?;

        if let Some(account_id) = input.linked_bank_account_id {
            owned_linked_account(&txn, input.user_id, account_id, input.currency).await?;
            lock_and_apply(
                &txn,
                LockKey::linked_account(account_id),
                BalanceOp::Reserve(input.amount),
            )
            .await?;
        }

        let row = insert_ramp(&txn, RampKind::Onramp, &input).await?;
        txn.commit().await?;

        info!(
            target: "wallet",
            token = %row.token,
            user_id = %input.user_id,
            amount = input.amount,
            "On-ramp initiated"
        );
        Ok(row)
    }

    /// Creates a `Processing` off-ramp transaction and locks the amount on
    /// the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if available funds do not cover the amount,
    /// `LinkedAccountNotFound` if the account is missing or not the user's,
    /// `CurrencyMismatch` if the balance or account is in another currency.
    pub async fn initiate_offramp(
        &self,
        input: InitiateRampInput,
    ) -> Result<ramp_transactions::Model, WalletError> {
        let account_id = input
            .linked_bank_account_id
            .ok_or(WalletError::LinkedAccountRequired)?;

        let txn = self.db.begin().await?;

        let balance_id = self.prepare(&txn, &input).await?;
        owned_linked_account(&txn, input.user_id, account_id, input.currency).await?;
        lock_and_apply(
            &txn,
            LockKey::balance(balance_id),
            BalanceOp::Reserve(input.amount),
        )
        .await?;

        let row = insert_ramp(&txn, RampKind::Offramp, &input).await?;
        txn.commit().await?;

        info!(
            target: "wallet",
            token = %row.token,
            user_id = %input.user_id,
            amount = input.amount,
            "Off-ramp initiated"
        );
        Ok(row)
    }

    /// Moves `amount` from `sender` to `receiver` and posts `p2p:<transfer_id>`.
    ///
    /// Both balance rows are locked in ascending id order regardless of
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns `SelfTransfer`, `UserNotFound`, `InsufficientFunds`, or a
    /// ledger/database error. Nothing is applied on error.
    pub async fn p2p_transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: i64,
        currency: Currency,
    ) -> Result<TransferReceipt, WalletError> {
        if sender == receiver {
            return Err(WalletError::SelfTransfer);
        }
        if amount <= 0 {
            return Err(BalanceError::NonPositiveAmount(amount).into());
        }

        let txn = self.db.begin().await?;

        ensure_user(&txn, sender).await?;
        ensure_user(&txn, receiver).await?;
        let sender_key = LockKey::balance(ensure_balance(&txn, sender, currency).await?);
        let receiver_key = LockKey::balance(ensure_balance(&txn, receiver, currency).await?);

        let locked = lock_rows(&txn, [sender_key, receiver_key]).await?;
        let current = |key: LockKey| {
            locked
                .get(&key)
                .copied()
                .ok_or_else(|| BalanceError::NotFound(format!("locked row {key:?}")))
        };

        let sender_balance =
            apply_op(&txn, sender_key, current(sender_key)?, BalanceOp::Debit(amount)).await?;
        apply_op(&txn, receiver_key, current(receiver_key)?, BalanceOp::Credit(amount)).await?;

        let transfer_id = TransferId::new();
        let request = PostingRequest::transfer(
            LedgerTransactionType::P2p,
            &transfer_id.to_string(),
            ensure_user_cash_account(&txn, sender, currency).await?,
            ensure_user_cash_account(&txn, receiver, currency).await?,
            amount,
            currency,
        )?;
        let posted = post_in(&txn, &request).await?;

        p2p_transfers::ActiveModel {
            id: Set(transfer_id.into_inner()),
            sender_id: Set(sender.into_inner()),
            receiver_id: Set(receiver.into_inner()),
            amount: Set(amount),
            currency: Set(currency.as_str().to_string()),
            ledger_transaction_id: Set(posted.id.into_inner()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            target: "wallet",
            transfer_id = %transfer_id,
            sender = %sender,
            receiver = %receiver,
            amount,
            "P2P transfer completed"
        );

        Ok(TransferReceipt {
            transfer_id,
            ledger_transaction_id: posted.id,
            sender_balance,
        })
    }

    /// Finds a ramp transaction by token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_transaction(
        &self,
        token: &str,
    ) -> Result<Option<ramp_transactions::Model>, DbErr> {
        ramp_transactions::Entity::find()
            .filter(ramp_transactions::Column::Token.eq(token))
            .one(&self.db)
            .await
    }

    /// Validates input and provisions the user's balance row.
    async fn prepare(
        &self,
        txn: &DatabaseTransaction,
        input: &InitiateRampInput,
    ) -> Result<i64, WalletError> {
        if input.amount <= 0 {
            return Err(BalanceError::NonPositiveAmount(input.amount).into());
        }
        if input.provider.trim().is_empty() {
            return Err(WalletError::MissingProvider);
        }
        ensure_user(txn, input.user_id).await?;
        Ok(ensure_balance(txn, input.user_id, input.currency).await?)
    }
}

async fn ensure_user(txn: &DatabaseTransaction, user_id: UserId) -> Result<(), WalletError> {
    users::Entity::find_by_id(user_id.into_inner())
        .one(txn)
        .await?
        .map(|_| ())
        .ok_or(WalletError::UserNotFound(user_id))
}

async fn owned_linked_account(
    txn: &DatabaseTransaction,
    user_id: UserId,
    account_id: i64,
    currency: Currency,
) -> Result<linked_bank_accounts::Model, WalletError> {
    let account = linked_bank_accounts::Entity::find_by_id(account_id)
        .filter(linked_bank_accounts::Column::UserId.eq(user_id.into_inner()))
        .one(txn)
        .await?
        .ok_or(WalletError::LinkedAccountNotFound(account_id))?;

    ensure_currency(&account.currency, currency)?;
    Ok(account)
}

/// Generates an opaque settlement token.
fn new_token(kind: RampKind) -> String {
    let prefix = match kind {
        RampKind::Onramp => "onr",
        RampKind::Offramp => "ofr",
    };
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

async fn insert_ramp(
    txn: &DatabaseTransaction,
    kind: RampKind,
    input: &InitiateRampInput,
) -> Result<ramp_transactions::Model, WalletError> {
    let now = Utc::now();
    let token = new_token(kind);

    let metadata = input.metadata.clone().merge(
        Metadata::new()
            .with("initiatedAt", json!(now.to_rfc3339()))
            .with("provider", input.provider.clone()),
    );

    let row = ramp_transactions::ActiveModel {
        id: Set(RampTransactionId::new().into_inner()),
        kind: Set(DbRampKind::from(kind)),
        token: Set(token),
        user_id: Set(input.user_id.into_inner()),
        amount: Set(input.amount),
        currency: Set(input.currency.as_str().to_string()),
        provider: Set(input.provider.clone()),
        linked_bank_account_id: Set(input.linked_bank_account_id),
        status: Set(TxnStatus::Processing.into()),
        failure_reason_code: Set(None),
        failure_reason_message: Set(None),
        metadata: Set(metadata.into_value()),
        started_at: Set(now.into()),
        completed_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(row.insert(txn).await?)
}
