//! Audit sink.
//!
//! Audit and security events are written after the financial transaction
//! has committed. Writes are best-effort: a failure is logged and never
//! reaches the caller.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use rampart_shared::types::UserId;

use crate::entities::{audit_logs, sea_orm_active_enums::AuditCategory};

/// One audit or security event.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event category.
    pub category: AuditCategory,
    /// What happened, e.g. `webhook.settled`.
    pub action: String,
    /// Operator or system component responsible.
    pub actor: Option<String>,
    /// Affected user.
    pub user_id: Option<UserId>,
    /// Affected transaction token.
    pub token: Option<String>,
    /// Event details.
    pub details: Value,
}

impl AuditEvent {
    /// Creates an audit event.
    #[must_use]
    pub fn audit(action: impl Into<String>) -> Self {
        Self::new(AuditCategory::Audit, action)
    }

    /// Creates a security event.
    #[must_use]
    pub fn security(action: impl Into<String>) -> Self {
        Self::new(AuditCategory::Security, action)
    }

    fn new(category: AuditCategory, action: impl Into<String>) -> Self {
        Self {
            category,
            action: action.into(),
            actor: None,
            user_id: None,
            token: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the actor.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Sets the affected user.
    #[must_use]
    pub const fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the affected token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the details object.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Audit log repository.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    db: DatabaseConnection,
}

impl AuditRepository {
    /// Creates a new audit repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Writes one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn record(&self, event: AuditEvent) -> Result<audit_logs::Model, DbErr> {
        audit_logs::ActiveModel {
            id: Set(Uuid::now_v7()),
            category: Set(event.category),
            action: Set(event.action),
            actor: Set(event.actor),
            user_id: Set(event.user_id.map(UserId::into_inner)),
            token: Set(event.token),
            details: Set(event.details),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Writes one event on a background task; failures are only logged.
    pub fn record_detached(&self, event: AuditEvent) {
        let repo = self.clone();
        tokio::spawn(async move {
            let action = event.action.clone();
            if let Err(e) = repo.record(event).await {
                warn!(target: "audit", action = %action, error = %e, "Failed to write audit event");
            }
        });
    }

    /// Lists events for a token, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_token(&self, token: &str) -> Result<Vec<audit_logs::Model>, DbErr> {
        audit_logs::Entity::find()
            .filter(audit_logs::Column::Token.eq(token))
            .order_by_desc(audit_logs::Column::CreatedAt)
            .all(&self.db)
            .await
    }
}
