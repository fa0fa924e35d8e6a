//! Core settlement logic for Rampart.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Every decision the settlement backbone makes is computed here and then
//! executed by the repositories in `rampart-db`.
//!
//! # Modules
//!
//! - `ledger` - Double-entry posting validation and replay comparison
//! - `balance` - Balance/lock arithmetic and deterministic lock ordering
//! - `settlement` - Webhook payloads, the transaction claim state machine, metadata merge
//! - `delivery` - Outbound delivery backoff, failure classification, DLQ replay records

pub mod balance;
pub mod delivery;
pub mod ledger;
pub mod settlement;
