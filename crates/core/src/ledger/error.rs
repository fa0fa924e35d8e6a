//! Ledger error types.
//!
//! Every variant here aborts the surrounding database transaction. None of
//! them is a caller mistake on the webhook path, so all map to 500 there.

use rampart_shared::types::Currency;
use thiserror::Error;

/// Errors that can occur while validating or posting a ledger transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Transaction must have at least 2 entries.
    #[error("Ledger transaction must have at least 2 entries")]
    InsufficientEntries,

    /// Entry amount must be a positive integer.
    #[error("Ledger entry amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Debits and credits differ for a currency.
    #[error("Ledger transaction is unbalanced in {currency}. Debit: {debit}, Credit: {credit}")]
    UnbalancedLedgerTransaction {
        /// Currency whose totals differ.
        currency: Currency,
        /// Total debits in minor units.
        debit: i128,
        /// Total credits in minor units.
        credit: i128,
    },

    /// External reference must not be blank.
    #[error("Ledger transaction external reference is empty")]
    EmptyExternalRef,

    /// The external reference already exists with different entries.
    #[error("Idempotency collision on external reference {0}: stored entries differ")]
    IdempotencyCollision(String),

    /// Stored data could not be interpreted.
    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Returns the error code for API responses and logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientEntries => "INSUFFICIENT_ENTRIES",
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::UnbalancedLedgerTransaction { .. } => "UNBALANCED_LEDGER_TRANSACTION",
            Self::EmptyExternalRef => "EMPTY_EXTERNAL_REF",
            Self::IdempotencyCollision(_) => "IDEMPOTENCY_COLLISION",
            Self::CorruptRow(_) => "CORRUPT_LEDGER_ROW",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        500
    }

    /// Returns true if this error means a financial invariant would break.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        !matches!(self, Self::Database(_))
    }
}
