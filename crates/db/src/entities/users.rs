//! `SeaORM` Entity for users table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub full_name: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::balances::Entity")]
    Balances,
    #[sea_orm(has_many = "super::linked_bank_accounts::Entity")]
    LinkedBankAccounts,
    #[sea_orm(has_many = "super::ramp_transactions::Entity")]
    RampTransactions,
}

impl Related<super::balances::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Balances.def()
    }
}

impl Related<super::linked_bank_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LinkedBankAccounts.def()
    }
}

impl Related<super::ramp_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RampTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
