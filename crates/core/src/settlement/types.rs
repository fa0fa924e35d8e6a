//! Settlement enums shared by the webhook, the claim engine and storage.

use serde::{Deserialize, Serialize};

/// Failure reason that keeps funds locked and allows a later success.
pub const BANK_TIMEOUT: &str = "BANK_TIMEOUT";

/// Returns true if `code` is exactly [`BANK_TIMEOUT`].
#[must_use]
pub fn is_bank_timeout(code: Option<&str>) -> bool {
    code == Some(BANK_TIMEOUT)
}

/// Direction of a ramp transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RampKind {
    /// Deposit: external funds into the wallet.
    Onramp,
    /// Withdrawal: wallet funds out to a bank account.
    Offramp,
}

impl RampKind {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Onramp => "ONRAMP",
            Self::Offramp => "OFFRAMP",
        }
    }
}

impl std::fmt::Display for RampKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ramp transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnStatus {
    /// Created, waiting for the provider webhook.
    Processing,
    /// Settled successfully (terminal).
    Success,
    /// Settled as failed (terminal, except after `BANK_TIMEOUT`).
    Failure,
}

impl TxnStatus {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Success => "Success",
            Self::Failure => "Failure",
        }
    }

    /// Returns true for `Success` and `Failure`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status reported by a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookStatus {
    /// Provider completed the transfer.
    Success,
    /// Provider failed the transfer.
    Failure,
}

impl From<WebhookStatus> for TxnStatus {
    fn from(status: WebhookStatus) -> Self {
        match status {
            WebhookStatus::Success => Self::Success,
            WebhookStatus::Failure => Self::Failure,
        }
    }
}
