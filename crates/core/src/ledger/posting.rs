//! Posting requests and replay comparison.
//!
//! A ledger transaction is created at most once per external reference.
//! When a second posting with the same reference arrives, the stored entries
//! are compared with the requested ones after both are normalised: an exact
//! match is a safe replay, anything else is an idempotency collision.

use rampart_shared::types::{Currency, LedgerAccountId};

use super::error::LedgerError;
use super::types::{LedgerEntryInput, LedgerTransactionType};
use super::validation::validate_entries;

/// A validated request to post one balanced ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRequest {
    /// What produced the posting.
    pub txn_type: LedgerTransactionType,
    /// Globally unique idempotency reference.
    pub external_ref: String,
    /// Entries, at least two, balanced per currency.
    pub entries: Vec<LedgerEntryInput>,
}

impl PostingRequest {
    /// Builds and validates a posting request.
    ///
    /// # Errors
    ///
    /// Returns `EmptyExternalRef` for a blank reference, otherwise any error
    /// from [`validate_entries`].
    pub fn new(
        txn_type: LedgerTransactionType,
        external_ref: impl Into<String>,
        entries: Vec<LedgerEntryInput>,
    ) -> Result<Self, LedgerError> {
        let external_ref = external_ref.into();
        if external_ref.trim().is_empty() {
            return Err(LedgerError::EmptyExternalRef);
        }
        validate_entries(&entries)?;

        Ok(Self {
            txn_type,
            external_ref,
            entries,
        })
    }

    /// Two-legged posting: `amount` moves from `debit_account` to `credit_account`.
    ///
    /// # Errors
    ///
    /// Same as [`PostingRequest::new`].
    pub fn transfer(
        txn_type: LedgerTransactionType,
        key: &str,
        debit_account: LedgerAccountId,
        credit_account: LedgerAccountId,
        amount: i64,
        currency: Currency,
    ) -> Result<Self, LedgerError> {
        Self::new(
            txn_type,
            txn_type.external_ref(key),
            vec![
                LedgerEntryInput::debit(debit_account, amount, currency),
                LedgerEntryInput::credit(credit_account, amount, currency),
            ],
        )
    }
}

/// Sorts entries by `(account_id, direction, currency, amount)`.
#[must_use]
pub fn normalize(entries: &[LedgerEntryInput]) -> Vec<LedgerEntryInput> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        a.account_id
            .cmp(&b.account_id)
            .then(a.direction.cmp(&b.direction))
            .then(a.currency.cmp(&b.currency))
            .then(a.amount.cmp(&b.amount))
    });
    sorted
}

/// Returns true if both entry sets are equal regardless of order.
#[must_use]
pub fn entries_match(expected: &[LedgerEntryInput], existing: &[LedgerEntryInput]) -> bool {
    expected.len() == existing.len() && normalize(expected) == normalize(existing)
}
