//! Transaction claim state machine.
//!
//! [`evaluate`] compares a validated webhook with the stored transaction and
//! either rejects it before any mutation or returns a [`ClaimPlan`]: the
//! predicate of the conditional update and the balance/ledger effects the
//! winner applies. Losing the conditional update is reported as
//! `AlreadyProcessed`, same as a terminal-state guard hit.

use rampart_shared::types::{LedgerTransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::types::{RampKind, TxnStatus, WebhookStatus, is_bank_timeout};
use super::webhook::WebhookPayload;
use crate::balance::{BalanceOp, BalanceSnapshot};
use crate::ledger::LedgerTransactionType;

/// The stored fields the claim decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSnapshot {
    /// Transaction token.
    pub token: String,
    /// On-ramp or off-ramp.
    pub kind: RampKind,
    /// Owner.
    pub user_id: UserId,
    /// Amount in minor units.
    pub amount: i64,
    /// Current status.
    pub status: TxnStatus,
    /// Stored failure reason, set only when `status` is `Failure`.
    pub failure_reason_code: Option<String>,
    /// Linked bank account of the transaction, if any.
    pub linked_bank_account_id: Option<i64>,
}

/// Why a webhook did not produce a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRejection {
    /// No transaction of that kind has the token.
    NotFound,
    /// Webhook user differs from the owner.
    UserMismatch,
    /// Webhook amount differs from the stored amount.
    AmountMismatch,
    /// Webhook bank account differs from the withdrawal's account.
    AccountMismatch,
    /// Terminal already, or a concurrent claim won.
    AlreadyProcessed,
}

impl ClaimRejection {
    /// Outcome code for logs and audit records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UserMismatch => "user_mismatch",
            Self::AmountMismatch => "amount_mismatch",
            Self::AccountMismatch => "account_mismatch",
            Self::AlreadyProcessed => "already_processed",
        }
    }

    /// Returns the HTTP status code for the webhook response.
    ///
    /// A redelivered webhook is not an error for the provider.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::UserMismatch | Self::AmountMismatch | Self::AccountMismatch => 400,
            Self::AlreadyProcessed => 200,
        }
    }

    /// Returns true for rejections that may indicate tampering.
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::UserMismatch | Self::AmountMismatch | Self::AccountMismatch
        )
    }
}

impl std::fmt::Display for ClaimRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses the conditional update may transition from.
///
/// A success always uses `ProcessingOrTimedOut`: a success racing a
/// `BANK_TIMEOUT` failure that committed first still wins at update time,
/// and the stored reason is re-checked by the update itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimFrom {
    /// `status = Processing`.
    Processing,
    /// `status = Processing`, or `Failure` with reason `BANK_TIMEOUT`.
    ProcessingOrTimedOut,
}

/// Balance and ledger effects of a winning claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettlementEffects {
    /// Operation on the user's balance row.
    pub balance: Option<BalanceOp>,
    /// Operation on the linked bank account row.
    pub linked_account: Option<BalanceOp>,
    /// Ledger posting to create.
    pub ledger: Option<LedgerTransactionType>,
}

impl SettlementEffects {
    /// Effects of moving a transaction to `to`.
    ///
    /// Funds are never released for `BANK_TIMEOUT`: a late success consumes
    /// the same lock.
    #[must_use]
    pub fn for_transition(
        kind: RampKind,
        to: TxnStatus,
        amount: i64,
        failure_reason_code: Option<&str>,
        has_linked_account: bool,
    ) -> Self {
        let linked = |op: BalanceOp| has_linked_account.then_some(op);

        match (kind, to) {
            (_, TxnStatus::Processing) => Self::default(),
            (_, TxnStatus::Failure) if is_bank_timeout(failure_reason_code) => Self::default(),
            (RampKind::Onramp, TxnStatus::Success) => Self {
                balance: Some(BalanceOp::Credit(amount)),
                linked_account: linked(BalanceOp::SettleLocked(amount)),
                ledger: Some(LedgerTransactionType::Onramp),
            },
            (RampKind::Onramp, TxnStatus::Failure) => Self {
                balance: None,
                linked_account: linked(BalanceOp::Release(amount)),
                ledger: None,
            },
            (RampKind::Offramp, TxnStatus::Success) => Self {
                balance: Some(BalanceOp::SettleLocked(amount)),
                linked_account: linked(BalanceOp::Credit(amount)),
                ledger: Some(LedgerTransactionType::Offramp),
            },
            (RampKind::Offramp, TxnStatus::Failure) => Self {
                balance: Some(BalanceOp::Release(amount)),
                linked_account: None,
                ledger: None,
            },
        }
    }

    /// Returns true if the claim returns locked funds.
    #[must_use]
    pub fn releases_funds(&self) -> bool {
        matches!(self.balance, Some(BalanceOp::Release(_)))
            || matches!(self.linked_account, Some(BalanceOp::Release(_)))
    }
}

/// What a claim that passed every guard will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPlan {
    /// Terminal status to set.
    pub to: TxnStatus,
    /// Predicate of the conditional update.
    pub from: ClaimFrom,
    /// Failure reason to store (only for `Failure`).
    pub failure_reason_code: Option<String>,
    /// Failure message to store (only for `Failure`).
    pub failure_reason_message: Option<String>,
    /// Effects the winner applies in the same database transaction.
    pub effects: SettlementEffects,
    /// The stored row was a `BANK_TIMEOUT` failure when evaluated.
    pub timeout_override: bool,
}

/// Decides whether `payload` may claim `current`.
///
/// # Errors
///
/// Returns the rejection. Nothing has been mutated at this point.
pub fn evaluate(
    current: Option<&TransactionSnapshot>,
    payload: &WebhookPayload,
) -> Result<ClaimPlan, ClaimRejection> {
    let Some(txn) = current else {
        return Err(ClaimRejection::NotFound);
    };

    if txn.kind != payload.kind || txn.token != payload.token {
        return Err(ClaimRejection::NotFound);
    }
    if txn.user_id != payload.user_identifier {
        return Err(ClaimRejection::UserMismatch);
    }
    if txn.amount != payload.amount {
        return Err(ClaimRejection::AmountMismatch);
    }
    if txn.kind == RampKind::Offramp
        && let Some(account) = payload.linked_bank_account_id
        && txn.linked_bank_account_id != Some(account)
    {
        return Err(ClaimRejection::AccountMismatch);
    }

    let timeout_override = match (txn.status, payload.status) {
        (TxnStatus::Processing, _) => false,
        (TxnStatus::Failure, WebhookStatus::Success)
            if is_bank_timeout(txn.failure_reason_code.as_deref()) =>
        {
            true
        }
        (TxnStatus::Success | TxnStatus::Failure, _) => {
            return Err(ClaimRejection::AlreadyProcessed);
        }
    };

    let from = match payload.status {
        WebhookStatus::Success => ClaimFrom::ProcessingOrTimedOut,
        WebhookStatus::Failure => ClaimFrom::Processing,
    };

    let to = TxnStatus::from(payload.status);
    let (failure_reason_code, failure_reason_message) = match to {
        TxnStatus::Failure => (
            payload.failure_reason_code.clone(),
            payload.failure_reason_message.clone(),
        ),
        _ => (None, None),
    };

    let effects = SettlementEffects::for_transition(
        txn.kind,
        to,
        txn.amount,
        failure_reason_code.as_deref(),
        txn.linked_bank_account_id.is_some(),
    );

    Ok(ClaimPlan {
        to,
        from,
        failure_reason_code,
        failure_reason_message,
        effects,
        timeout_override,
    })
}

/// Result of driving a webhook through the claim engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Claim won with `Success`; the ledger posting exists.
    ProcessedSuccess {
        /// Posted (or replayed) ledger transaction.
        ledger_transaction_id: LedgerTransactionId,
        /// User balance after settlement.
        balance: BalanceSnapshot,
    },
    /// Claim won with `Failure`.
    ProcessedFailure {
        /// Whether locked funds were returned.
        funds_released: bool,
    },
    /// No mutation happened.
    Rejected(ClaimRejection),
}

impl ClaimOutcome {
    /// Outcome code for logs and audit records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessedSuccess { .. } => "processed_success",
            Self::ProcessedFailure { .. } => "processed_failure",
            Self::Rejected(rejection) => rejection.as_str(),
        }
    }

    /// Returns the HTTP status code for the webhook response.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ProcessedSuccess { .. } | Self::ProcessedFailure { .. } => 200,
            Self::Rejected(rejection) => rejection.http_status_code(),
        }
    }
}
