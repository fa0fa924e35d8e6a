//! `SeaORM` entity definitions.

pub mod prelude;

pub mod audit_logs;
pub mod balances;
pub mod delivery_jobs;
pub mod dlq_jobs;
pub mod idempotency_keys;
pub mod ledger_accounts;
pub mod ledger_entries;
pub mod ledger_transactions;
pub mod linked_bank_accounts;
pub mod p2p_transfers;
pub mod ramp_transactions;
pub mod sea_orm_active_enums;
pub mod users;
