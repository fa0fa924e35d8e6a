//! Outbound webhook delivery for Rampart.
//!
//! A fixed-size pool of workers pulls jobs from the delivery queue, POSTs
//! the signed payload to the receiver, and acks, retries with backoff, or
//! dead-letters each job according to the failure classification.
//!
//! # Modules
//!
//! - `store` - Queue operations the pool depends on
//! - `sender` - Signed HTTP delivery of one job
//! - `pool` - Worker loops, retry decisions, stale-lease recovery

pub mod pool;
pub mod sender;
pub mod store;

pub use pool::{WorkerPool, WorkerSettings};
pub use sender::WebhookSender;
pub use store::{DeliveryJob, JobStore};
