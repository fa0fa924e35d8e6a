//! Entity prelude.

pub use super::audit_logs::Entity as AuditLogs;
pub use super::balances::Entity as Balances;
pub use super::delivery_jobs::Entity as DeliveryJobs;
pub use super::dlq_jobs::Entity as DlqJobs;
pub use super::idempotency_keys::Entity as IdempotencyKeys;
pub use super::ledger_accounts::Entity as LedgerAccounts;
pub use super::ledger_entries::Entity as LedgerEntries;
pub use super::ledger_transactions::Entity as LedgerTransactions;
pub use super::linked_bank_accounts::Entity as LinkedBankAccounts;
pub use super::p2p_transfers::Entity as P2pTransfers;
pub use super::ramp_transactions::Entity as RampTransactions;
pub use super::users::Entity as Users;
