//! `SeaORM` active enums mirroring the Postgres enum types.
//!
//! Each enum converts to and from its domain counterpart in `rampart_core`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use rampart_core::delivery::{FailureClass as CoreFailureClass, JobState};
use rampart_core::ledger::{
    AccountType, Direction, LedgerTransactionType as CoreLedgerTransactionType,
};
use rampart_core::settlement::{RampKind as CoreRampKind, TxnStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ramp_kind")]
pub enum RampKind {
    #[sea_orm(string_value = "ONRAMP")]
    Onramp,
    #[sea_orm(string_value = "OFFRAMP")]
    Offramp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ramp_status")]
pub enum RampStatus {
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Success")]
    Success,
    #[sea_orm(string_value = "Failure")]
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ledger_direction")]
pub enum LedgerDirection {
    #[sea_orm(string_value = "DEBIT")]
    Debit,
    #[sea_orm(string_value = "CREDIT")]
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ledger_account_type")]
pub enum LedgerAccountType {
    #[sea_orm(string_value = "USER_CASH")]
    UserCash,
    #[sea_orm(string_value = "PLATFORM_CLEARING")]
    PlatformClearing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "ledger_transaction_type"
)]
pub enum LedgerTransactionType {
    #[sea_orm(string_value = "ONRAMP")]
    Onramp,
    #[sea_orm(string_value = "OFFRAMP")]
    Offramp,
    #[sea_orm(string_value = "P2P")]
    P2p,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "delivery_job_state")]
pub enum DeliveryJobState {
    #[sea_orm(string_value = "waiting")]
    Waiting,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "failure_class")]
pub enum FailureClass {
    #[sea_orm(string_value = "transient")]
    Transient,
    #[sea_orm(string_value = "permanent")]
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "audit_category")]
pub enum AuditCategory {
    #[sea_orm(string_value = "audit")]
    Audit,
    #[sea_orm(string_value = "security")]
    Security,
}

impl From<CoreRampKind> for RampKind {
    fn from(kind: CoreRampKind) -> Self {
        match kind {
            CoreRampKind::Onramp => Self::Onramp,
            CoreRampKind::Offramp => Self::Offramp,
        }
    }
}

impl From<RampKind> for CoreRampKind {
    fn from(kind: RampKind) -> Self {
        match kind {
            RampKind::Onramp => Self::Onramp,
            RampKind::Offramp => Self::Offramp,
        }
    }
}

impl From<TxnStatus> for RampStatus {
    fn from(status: TxnStatus) -> Self {
        match status {
            TxnStatus::Processing => Self::Processing,
            TxnStatus::Success => Self::Success,
            TxnStatus::Failure => Self::Failure,
        }
    }
}

impl From<RampStatus> for TxnStatus {
    fn from(status: RampStatus) -> Self {
        match status {
            RampStatus::Processing => Self::Processing,
            RampStatus::Success => Self::Success,
            RampStatus::Failure => Self::Failure,
        }
    }
}

impl From<Direction> for LedgerDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Debit => Self::Debit,
            Direction::Credit => Self::Credit,
        }
    }
}

impl From<LedgerDirection> for Direction {
    fn from(direction: LedgerDirection) -> Self {
        match direction {
            LedgerDirection::Debit => Self::Debit,
            LedgerDirection::Credit => Self::Credit,
        }
    }
}

impl From<AccountType> for LedgerAccountType {
    fn from(account_type: AccountType) -> Self {
        match account_type {
            AccountType::UserCash => Self::UserCash,
            AccountType::PlatformClearing => Self::PlatformClearing,
        }
    }
}

impl From<CoreLedgerTransactionType> for LedgerTransactionType {
    fn from(txn_type: CoreLedgerTransactionType) -> Self {
        match txn_type {
            CoreLedgerTransactionType::Onramp => Self::Onramp,
            CoreLedgerTransactionType::Offramp => Self::Offramp,
            CoreLedgerTransactionType::P2p => Self::P2p,
        }
    }
}

impl From<LedgerTransactionType> for CoreLedgerTransactionType {
    fn from(txn_type: LedgerTransactionType) -> Self {
        match txn_type {
            LedgerTransactionType::Onramp => Self::Onramp,
            LedgerTransactionType::Offramp => Self::Offramp,
            LedgerTransactionType::P2p => Self::P2p,
        }
    }
}

impl From<DeliveryJobState> for JobState {
    fn from(state: DeliveryJobState) -> Self {
        match state {
            DeliveryJobState::Waiting => Self::Waiting,
            DeliveryJobState::Active => Self::Active,
            DeliveryJobState::Completed => Self::Completed,
        }
    }
}

impl From<CoreFailureClass> for FailureClass {
    fn from(class: CoreFailureClass) -> Self {
        match class {
            CoreFailureClass::Transient => Self::Transient,
            CoreFailureClass::Permanent => Self::Permanent,
        }
    }
}

impl From<FailureClass> for CoreFailureClass {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Transient => Self::Transient,
            FailureClass::Permanent => Self::Permanent,
        }
    }
}
