//! Ledger poster.
//!
//! Posts balanced double-entry transactions keyed by an external reference.
//! The unique index on `external_ref` makes creation at-most-once; a second
//! posting with the same reference is compared entry by entry with the
//! stored one and either replays it or fails with an idempotency collision.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use tracing::{debug, error};

use rampart_core::ledger::{
    AccountType, LedgerEntryInput, LedgerError, PLATFORM_OWNER_KEY, PostingRequest,
    entries_match,
};
use rampart_shared::types::{Currency, LedgerAccountId, LedgerTransactionId, UserId};

use crate::entities::{
    ledger_accounts, ledger_entries, ledger_transactions,
    sea_orm_active_enums::{LedgerAccountType, LedgerTransactionType},
};

/// Result of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedTransaction {
    /// Created or replayed ledger transaction.
    pub id: LedgerTransactionId,
    /// True if the reference already existed with identical entries.
    pub replayed: bool,
}

/// Ledger transaction with its entries.
#[derive(Debug, Clone)]
pub struct LedgerTransactionWithEntries {
    /// Transaction header.
    pub transaction: ledger_transactions::Model,
    /// Entries, ordered by account then direction.
    pub entries: Vec<ledger_entries::Model>,
}

fn db_err(err: DbErr) -> LedgerError {
    LedgerError::Database(err.to_string())
}

/// Resolves a ledger account by natural key, creating it on first use.
///
/// # Errors
///
/// Returns `LedgerError::Database` if the upsert or lookup fails.
pub async fn ensure_account<C: ConnectionTrait>(
    conn: &C,
    owner_key: &str,
    account_type: AccountType,
    currency: Currency,
) -> Result<LedgerAccountId, LedgerError> {
    let db_type = LedgerAccountType::from(account_type);

    let account = ledger_accounts::ActiveModel {
        id: Set(LedgerAccountId::new().into_inner()),
        owner_key: Set(owner_key.to_string()),
        account_type: Set(db_type),
        currency: Set(currency.as_str().to_string()),
        created_at: Set(Utc::now().into()),
    };

    ledger_accounts::Entity::insert(account)
        .on_conflict(
            OnConflict::columns([
                ledger_accounts::Column::OwnerKey,
                ledger_accounts::Column::AccountType,
                ledger_accounts::Column::Currency,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(db_err)?;

    let account = ledger_accounts::Entity::find()
        .filter(ledger_accounts::Column::OwnerKey.eq(owner_key))
        .filter(ledger_accounts::Column::AccountType.eq(db_type))
        .filter(ledger_accounts::Column::Currency.eq(currency.as_str()))
        .one(conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| {
            LedgerError::Database(format!(
                "ledger account {owner_key}/{}/{currency} missing after upsert",
                account_type.as_str()
            ))
        })?;

    Ok(LedgerAccountId::from_uuid(account.id))
}

/// Resolves the user's cash account.
///
/// # Errors
///
/// See [`ensure_account`].
pub async fn ensure_user_cash_account<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    currency: Currency,
) -> Result<LedgerAccountId, LedgerError> {
    ensure_account(conn, &user_id.to_string(), AccountType::UserCash, currency).await
}

/// Resolves the platform clearing account.
///
/// # Errors
///
/// See [`ensure_account`].
pub async fn ensure_platform_clearing_account<C: ConnectionTrait>(
    conn: &C,
    currency: Currency,
) -> Result<LedgerAccountId, LedgerError> {
    ensure_account(conn, PLATFORM_OWNER_KEY, AccountType::PlatformClearing, currency).await
}

/// Posts `request` on `conn`, which is normally an open database transaction.
///
/// # Errors
///
/// - `IdempotencyCollision` if the reference exists with different entries
///   or a different transaction type
/// - `CorruptRow` if a stored entry cannot be read back
/// - `Database` on any database failure
pub async fn post_in<C: ConnectionTrait>(
    conn: &C,
    request: &PostingRequest,
) -> Result<PostedTransaction, LedgerError> {
    let now = Utc::now();
    let id = LedgerTransactionId::new();

    let header = ledger_transactions::ActiveModel {
        id: Set(id.into_inner()),
        transaction_type: Set(request.txn_type.into()),
        external_ref: Set(request.external_ref.clone()),
        created_at: Set(now.into()),
    };

    let inserted = ledger_transactions::Entity::insert(header)
        .on_conflict(
            OnConflict::column(ledger_transactions::Column::ExternalRef)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(db_err)?;

    if inserted == 0 {
        return replay_existing(conn, request).await;
    }

    let entries = request.entries.iter().map(|entry| ledger_entries::ActiveModel {
        id: Set(uuid::Uuid::now_v7()),
        transaction_id: Set(id.into_inner()),
        account_id: Set(entry.account_id.into_inner()),
        direction: Set(entry.direction.into()),
        amount: Set(entry.amount),
        currency: Set(entry.currency.as_str().to_string()),
        created_at: Set(now.into()),
    });

    ledger_entries::Entity::insert_many(entries)
        .exec_without_returning(conn)
        .await
        .map_err(db_err)?;

    debug!(
        target: "ledger",
        external_ref = %request.external_ref,
        ledger_transaction_id = %id,
        entries = request.entries.len(),
        "Ledger transaction posted"
    );

    Ok(PostedTransaction {
        id,
        replayed: false,
    })
}

/// Compares a conflicting posting with the stored transaction.
async fn replay_existing<C: ConnectionTrait>(
    conn: &C,
    request: &PostingRequest,
) -> Result<PostedTransaction, LedgerError> {
    let existing = ledger_transactions::Entity::find()
        .filter(ledger_transactions::Column::ExternalRef.eq(&request.external_ref))
        .one(conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| {
            LedgerError::Database(format!(
                "ledger transaction {} conflicted but was not found",
                request.external_ref
            ))
        })?;

    let stored_entries = ledger_entries::Entity::find()
        .filter(ledger_entries::Column::TransactionId.eq(existing.id))
        .all(conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(entry_input)
        .collect::<Result<Vec<_>, _>>()?;

    let same_type = existing.transaction_type == LedgerTransactionType::from(request.txn_type);
    if !same_type || !entries_match(&request.entries, &stored_entries) {
        error!(
            target: "ledger",
            external_ref = %request.external_ref,
            ledger_transaction_id = %existing.id,
            "Idempotency collision: reference reused with different entries"
        );
        return Err(LedgerError::IdempotencyCollision(request.external_ref.clone()));
    }

    debug!(
        target: "ledger",
        external_ref = %request.external_ref,
        ledger_transaction_id = %existing.id,
        "Ledger posting replayed"
    );

    Ok(PostedTransaction {
        id: LedgerTransactionId::from_uuid(existing.id),
        replayed: true,
    })
}

fn entry_input(entry: ledger_entries::Model) -> Result<LedgerEntryInput, LedgerError> {
    let currency = entry
        .currency
        .parse::<Currency>()
        .map_err(|e| LedgerError::CorruptRow(format!("ledger entry {}: {e}", entry.id)))?;

    Ok(LedgerEntryInput {
        account_id: LedgerAccountId::from_uuid(entry.account_id),
        direction: entry.direction.into(),
        amount: entry.amount,
        currency,
    })
}

/// Ledger repository.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Posts `request` in its own database transaction.
    ///
    /// # Errors
    ///
    /// See [`post_in`].
    pub async fn post(&self, request: &PostingRequest) -> Result<PostedTransaction, LedgerError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let posted = post_in(&txn, request).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(posted)
    }

    /// Finds a ledger transaction and its entries by external reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<LedgerTransactionWithEntries>, DbErr> {
        let Some(transaction) = ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::ExternalRef.eq(external_ref))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let entries = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::TransactionId.eq(transaction.id))
            .order_by_asc(ledger_entries::Column::AccountId)
            .order_by_asc(ledger_entries::Column::Direction)
            .all(&self.db)
            .await?;

        Ok(Some(LedgerTransactionWithEntries {
            transaction,
            entries,
        }))
    }

    /// Counts ledger transactions posted under `external_ref` (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_by_external_ref(&self, external_ref: &str) -> Result<u64, DbErr> {
        use sea_orm::PaginatorTrait;

        ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::ExternalRef.eq(external_ref))
            .count(&self.db)
            .await
    }
}
