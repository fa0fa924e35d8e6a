//! Ledger domain types for posting balanced transactions.

use rampart_shared::types::{Currency, LedgerAccountId};
use serde::{Deserialize, Serialize};

/// Owner key of system-owned ledger accounts.
pub const PLATFORM_OWNER_KEY: &str = "platform";

/// Entry direction.
///
/// Every posting carries at least one of each, and per currency the
/// debit total equals the credit total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Debit entry.
    Debit,
    /// Credit entry.
    Credit,
}

impl Direction {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of ledger account, part of the account's natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// A user's spendable wallet cash.
    UserCash,
    /// The platform's clearing account against the payment provider.
    PlatformClearing,
}

impl AccountType {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserCash => "USER_CASH",
            Self::PlatformClearing => "PLATFORM_CLEARING",
        }
    }
}

/// What produced a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerTransactionType {
    /// Settled deposit.
    Onramp,
    /// Settled withdrawal.
    Offramp,
    /// Wallet-to-wallet transfer.
    P2p,
}

impl LedgerTransactionType {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Onramp => "ONRAMP",
            Self::Offramp => "OFFRAMP",
            Self::P2p => "P2P",
        }
    }

    /// Builds the external reference for this posting type.
    ///
    /// `key` is the ramp token, or the transfer id for P2P.
    #[must_use]
    pub fn external_ref(&self, key: &str) -> String {
        match self {
            Self::Onramp => format!("onramp:{key}"),
            Self::Offramp => format!("offramp:{key}"),
            Self::P2p => format!("p2p:{key}"),
        }
    }
}

/// Input for a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryInput {
    /// The account to post to.
    pub account_id: LedgerAccountId,
    /// Debit or credit.
    pub direction: Direction,
    /// Amount in minor units, strictly positive.
    pub amount: i64,
    /// Currency of the entry.
    pub currency: Currency,
}

impl LedgerEntryInput {
    /// Creates a debit entry.
    #[must_use]
    pub const fn debit(account_id: LedgerAccountId, amount: i64, currency: Currency) -> Self {
        Self {
            account_id,
            direction: Direction::Debit,
            amount,
            currency,
        }
    }

    /// Creates a credit entry.
    #[must_use]
    pub const fn credit(account_id: LedgerAccountId, amount: i64, currency: Currency) -> Self {
        Self {
            account_id,
            direction: Direction::Credit,
            amount,
            currency,
        }
    }
}
