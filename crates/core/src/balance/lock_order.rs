//! Deterministic lock ordering.
//!
//! Every unit of work locks the balance and linked-account rows it touches
//! in ascending `(id, table)` order, whichever side of a transfer a row is
//! on. Two transfers touching the same rows in opposite roles then queue on
//! the first shared row instead of deadlocking.

use serde::{Deserialize, Serialize};

/// Table a lockable row lives in. Breaks ties between equal ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockTable {
    /// `balances`
    Balance,
    /// `linked_bank_accounts`
    LinkedAccount,
}

/// One row to lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Row id.
    pub id: i64,
    /// Table of the row.
    pub table: LockTable,
}

impl LockKey {
    /// Lock key of a balance row.
    #[must_use]
    pub const fn balance(id: i64) -> Self {
        Self {
            id,
            table: LockTable::Balance,
        }
    }

    /// Lock key of a linked bank account row.
    #[must_use]
    pub const fn linked_account(id: i64) -> Self {
        Self {
            id,
            table: LockTable::LinkedAccount,
        }
    }
}

/// Returns the keys sorted ascending with duplicates removed.
#[must_use]
pub fn lock_order(keys: impl IntoIterator<Item = LockKey>) -> Vec<LockKey> {
    let mut ordered: Vec<LockKey> = keys.into_iter().collect();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
