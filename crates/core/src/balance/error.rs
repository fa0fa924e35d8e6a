//! Balance error types.

use thiserror::Error;

/// Errors raised when a balance mutation would break a row invariant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Available funds (`amount - locked`) do not cover the request.
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Funds available to spend.
        available: i64,
        /// Amount requested.
        requested: i64,
    },

    /// Fewer funds are locked than the settlement releases.
    #[error("Insufficient locked funds: locked {locked}, requested {requested}")]
    InsufficientLocked {
        /// Currently locked funds.
        locked: i64,
        /// Amount the settlement tried to release or consume.
        requested: i64,
    },

    /// Operation amount must be positive.
    #[error("Balance operation amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// The result does not fit in `i64`.
    #[error("Balance arithmetic overflow")]
    Overflow,

    /// The row is kept in a different currency than the request.
    #[error("Currency mismatch: account holds {account}, request is in {requested}")]
    CurrencyMismatch {
        /// Currency of the stored row.
        account: String,
        /// Currency of the request.
        requested: String,
    },

    /// No balance row exists for the owner.
    #[error("Balance not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl BalanceError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InsufficientLocked { .. } => "INSUFFICIENT_LOCKED",
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::Overflow => "BALANCE_OVERFLOW",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::NotFound(_) => "BALANCE_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// Insufficient available funds is a normal business outcome at
    /// initiation time. Missing locked funds at settlement means the books
    /// are already wrong.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InsufficientFunds { .. } | Self::CurrencyMismatch { .. } => 422,
            Self::NonPositiveAmount(_) => 400,
            Self::NotFound(_) => 404,
            Self::InsufficientLocked { .. } | Self::Overflow | Self::Database(_) => 500,
        }
    }

    /// Returns true if this error indicates corrupted balances.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InsufficientLocked { .. } | Self::Overflow)
    }
}
