//! `SeaORM` Entity for ramp_transactions table.

use super::sea_orm_active_enums::{RampKind, RampStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "ramp_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: RampKind,
    #[sea_orm(unique)]
    pub token: String,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub linked_bank_account_id: Option<i64>,
    pub status: RampStatus,
    pub failure_reason_code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub failure_reason_message: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::linked_bank_accounts::Entity",
        from = "Column::LinkedBankAccountId",
        to = "super::linked_bank_accounts::Column::Id"
    )]
    LinkedBankAccounts,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::linked_bank_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LinkedBankAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
