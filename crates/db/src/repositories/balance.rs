//! Balance/lock manager.
//!
//! Every balance mutation follows the same protocol inside one database
//! transaction: provision missing rows, lock all touched rows in ascending
//! `(id, table)` order, check the mutation against the locked values, then
//! apply the deltas with a single `UPDATE` per row.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use tracing::error;

use rampart_core::balance::{
    BalanceError, BalanceOp, BalanceSnapshot, LockKey, LockTable, lock_order,
};
use rampart_shared::types::{Currency, UserId};

use crate::entities::{balances, linked_bank_accounts};

fn db_err(err: DbErr) -> BalanceError {
    BalanceError::Database(err.to_string())
}

/// Returns the id of the user's balance row, creating an empty one on first use.
///
/// A user holds one balance row; its currency is fixed by the first call.
///
/// # Errors
///
/// Returns `CurrencyMismatch` if the existing row is in another currency,
/// `BalanceError::Database` if the upsert or lookup fails.
pub async fn ensure_balance<C: ConnectionTrait>(
    conn: &C,
    user_id: UserId,
    currency: Currency,
) -> Result<i64, BalanceError> {
    let now = Utc::now();
    let row = balances::ActiveModel {
        user_id: Set(user_id.into_inner()),
        currency: Set(currency.as_str().to_string()),
        amount: Set(0),
        locked: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    balances::Entity::insert(row)
        .on_conflict(
            OnConflict::column(balances::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(db_err)?;

    let balance = balances::Entity::find()
        .filter(balances::Column::UserId.eq(user_id.into_inner()))
        .one(conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| BalanceError::NotFound(format!("balance for user {user_id}")))?;

    ensure_currency(&balance.currency, currency)?;
    Ok(balance.id)
}

/// Rejects a request whose currency differs from the stored row's.
///
/// # Errors
///
/// Returns `CurrencyMismatch` when they differ.
pub fn ensure_currency(stored: &str, requested: Currency) -> Result<(), BalanceError> {
    if stored == requested.as_str() {
        Ok(())
    } else {
        Err(BalanceError::CurrencyMismatch {
            account: stored.to_string(),
            requested: requested.as_str().to_string(),
        })
    }
}

/// Locks every row in `keys` with `SELECT ... FOR UPDATE`, in lock order.
///
/// # Errors
///
/// Returns `NotFound` for a missing row, `Database` on query failure.
pub async fn lock_rows<C: ConnectionTrait>(
    conn: &C,
    keys: impl IntoIterator<Item = LockKey>,
) -> Result<BTreeMap<LockKey, BalanceSnapshot>, BalanceError> {
    let mut locked = BTreeMap::new();

    for key in lock_order(keys) {
        let snapshot = match key.table {
            LockTable::Balance => balances::Entity::find_by_id(key.id)
                .lock_exclusive()
                .one(conn)
                .await
                .map_err(db_err)?
                .map(|row| BalanceSnapshot::new(row.amount, row.locked)),
            LockTable::LinkedAccount => linked_bank_accounts::Entity::find_by_id(key.id)
                .lock_exclusive()
                .one(conn)
                .await
                .map_err(db_err)?
                .map(|row| BalanceSnapshot::new(row.amount, row.locked)),
        };

        let snapshot = snapshot.ok_or_else(|| BalanceError::NotFound(describe(key)))?;
        locked.insert(key, snapshot);
    }

    Ok(locked)
}

/// Applies `op` to a row previously locked with [`lock_rows`].
///
/// The new values are checked against `current` before the update is sent;
/// the table `CHECK` constraints back the same invariants.
///
/// # Errors
///
/// Returns the `BalanceError` from the check, or `Database` on update failure.
pub async fn apply_op<C: ConnectionTrait>(
    conn: &C,
    key: LockKey,
    current: BalanceSnapshot,
    op: BalanceOp,
) -> Result<BalanceSnapshot, BalanceError> {
    let next = current.apply(op).inspect_err(|e| {
        if e.is_invariant_violation() {
            error!(
                target: "balance",
                row = %describe(key),
                amount = current.amount,
                locked = current.locked,
                op = ?op,
                error = %e,
                "Balance invariant violation"
            );
        }
    })?;
    let (d_amount, d_locked) = op.delta();
    let now = Utc::now();

    let updated = match key.table {
        LockTable::Balance => balances::Entity::update_many()
            .col_expr(
                balances::Column::Amount,
                Expr::col(balances::Column::Amount).add(d_amount),
            )
            .col_expr(
                balances::Column::Locked,
                Expr::col(balances::Column::Locked).add(d_locked),
            )
            .col_expr(balances::Column::UpdatedAt, Expr::value(now))
            .filter(balances::Column::Id.eq(key.id))
            .exec(conn)
            .await
            .map_err(db_err)?,
        LockTable::LinkedAccount => linked_bank_accounts::Entity::update_many()
            .col_expr(
                linked_bank_accounts::Column::Amount,
                Expr::col(linked_bank_accounts::Column::Amount).add(d_amount),
            )
            .col_expr(
                linked_bank_accounts::Column::Locked,
                Expr::col(linked_bank_accounts::Column::Locked).add(d_locked),
            )
            .col_expr(linked_bank_accounts::Column::UpdatedAt, Expr::value(now))
            .filter(linked_bank_accounts::Column::Id.eq(key.id))
            .exec(conn)
            .await
            .map_err(db_err)?,
    };

    if updated.rows_affected != 1 {
        return Err(BalanceError::NotFound(describe(key)));
    }

    Ok(next)
}

/// Locks a single row and applies `op` to it.
///
/// # Errors
///
/// See [`lock_rows`] and [`apply_op`].
pub async fn lock_and_apply<C: ConnectionTrait>(
    conn: &C,
    key: LockKey,
    op: BalanceOp,
) -> Result<BalanceSnapshot, BalanceError> {
    let locked = lock_rows(conn, [key]).await?;
    let current = locked
        .get(&key)
        .copied()
        .ok_or_else(|| BalanceError::NotFound(describe(key)))?;
    apply_op(conn, key, current, op).await
}

fn describe(key: LockKey) -> String {
    match key.table {
        LockTable::Balance => format!("balance {}", key.id),
        LockTable::LinkedAccount => format!("linked bank account {}", key.id),
    }
}

/// Read access to wallet balances.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    db: DatabaseConnection,
}

impl BalanceRepository {
    /// Creates a new balance repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Gets the user's balance row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_user(&self, user_id: UserId) -> Result<Option<balances::Model>, DbErr> {
        balances::Entity::find()
            .filter(balances::Column::UserId.eq(user_id.into_inner()))
            .one(&self.db)
            .await
    }

    /// Gets a linked bank account row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_linked_account(
        &self,
        id: i64,
    ) -> Result<Option<linked_bank_accounts::Model>, DbErr> {
        linked_bank_accounts::Entity::find_by_id(id).one(&self.db).await
    }
}
