//! `SeaORM` Entity for dlq_jobs table.

use super::sea_orm_active_enums::FailureClass;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "dlq_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub source_queue: String,
    pub source_job_id: String,
    pub token: String,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    #[sea_orm(column_type = "Text")]
    pub secret: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub webhook_event_id: String,
    #[sea_orm(column_type = "Text")]
    pub failure_reason: String,
    pub failure_class: FailureClass,
    pub failed_at: DateTimeWithTimeZone,
    pub attempts: i32,
    pub archived_at: Option<DateTimeWithTimeZone>,
    pub archived_by: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub archive_reason: Option<String>,
    pub replay_count: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub replay_history: Json,
    pub last_replayed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
