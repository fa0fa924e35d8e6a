//! Double-entry bookkeeping logic.
//!
//! This module implements the pure half of the ledger poster:
//! - Entry and posting types
//! - Balance validation per currency
//! - Normalisation used to compare an idempotent replay with the stored posting
//! - Error types for ledger operations

pub mod error;
pub mod posting;
pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use error::LedgerError;
pub use posting::{PostingRequest, entries_match, normalize};
pub use types::{AccountType, Direction, LedgerEntryInput, LedgerTransactionType, PLATFORM_OWNER_KEY};
pub use validation::validate_entries;
