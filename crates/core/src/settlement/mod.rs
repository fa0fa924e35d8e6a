//! Transaction settlement.
//!
//! Inbound provider webhooks settle on-ramp and off-ramp transactions. This
//! module parses the payload, decides whether the claim may proceed and what
//! financial effects a winning claim has, and merges transaction metadata.
//! Executing the claim is the job of the settlement repository.

pub mod claim;
pub mod metadata;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod claim_props;

pub use claim::{
    ClaimFrom, ClaimOutcome, ClaimPlan, ClaimRejection, SettlementEffects, TransactionSnapshot,
    evaluate,
};
pub use metadata::Metadata;
pub use types::{BANK_TIMEOUT, RampKind, TxnStatus, WebhookStatus, is_bank_timeout};
pub use webhook::{PayloadError, WebhookPayload};
