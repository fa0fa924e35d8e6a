//! Balance and lock arithmetic.
//!
//! The database layer locks rows and runs the updates; this module decides
//! the lock order and whether a mutation keeps every row valid.

pub mod error;
pub mod lock_order;
pub mod ops;

#[cfg(test)]
mod ops_props;

pub use error::BalanceError;
pub use lock_order::{LockKey, LockTable, lock_order};
pub use ops::{BalanceOp, BalanceSnapshot};
