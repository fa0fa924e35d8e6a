//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.
//! The ledger and balance modules also expose connection-generic functions
//! so several repositories can compose them inside one database transaction.

pub mod audit;
pub mod balance;
pub mod delivery;
pub mod dlq;
pub mod idempotency;
pub mod ledger;
pub mod settlement;
pub mod user;
pub mod wallet;

pub use audit::{AuditEvent, AuditRepository};
pub use balance::BalanceRepository;
pub use delivery::{DeliveryQueue, Enqueued, NewDelivery, QueueDefaults, QueueError};
pub use dlq::{
    BulkReplayItem, BulkReplayRequest, DlqError, DlqFilter, DlqStore, ReplayOptions, ReplayResult,
    ReplayTarget, ResolveGroupResult,
};
pub use idempotency::{IdempotencyError, IdempotencyRepository, Reservation};
pub use ledger::{LedgerRepository, LedgerTransactionWithEntries, PostedTransaction};
pub use settlement::{SettlementError, SettlementRepository};
pub use user::UserRepository;
pub use wallet::{InitiateRampInput, TransferReceipt, WalletError, WalletRepository};
