//! Idempotency cache.
//!
//! A key is reserved before the protected operation runs and completed with
//! the response afterwards. Later requests with the same key get the stored
//! response instead of re-executing. A reservation without a response is in
//! flight; it is released if the operation fails so a corrected retry can
//! run, and reclaimed once it expires.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tracing::debug;

use rampart_shared::types::UserId;

use crate::entities::idempotency_keys;

/// Error types for idempotency operations.
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    /// Another request holding this key has not finished yet.
    #[error("A request with this idempotency key is still in flight")]
    InFlight,

    /// The key was used for a different user or action.
    #[error("Idempotency key was used for a different request")]
    KeyMismatch,

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl IdempotencyError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InFlight => "IDEMPOTENCY_IN_FLIGHT",
            Self::KeyMismatch => "IDEMPOTENCY_KEY_MISMATCH",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InFlight => 409,
            Self::KeyMismatch => 422,
            Self::Database(_) => 500,
        }
    }
}

/// Outcome of reserving a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the key and must run the operation.
    Fresh,
    /// The operation already ran; return this response.
    Replay {
        /// Stored HTTP status.
        status: u16,
        /// Stored response body.
        body: Value,
    },
}

/// Idempotency repository.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    db: DatabaseConnection,
    ttl: Duration,
}

impl IdempotencyRepository {
    /// Creates a new idempotency repository; keys live for `ttl`.
    #[must_use]
    pub const fn new(db: DatabaseConnection, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Reserves `key` for `(user_id, action)`.
    ///
    /// # Errors
    ///
    /// Returns `InFlight` if another request holds the key, `KeyMismatch` if
    /// it belongs to another user or action.
    pub async fn reserve(
        &self,
        key: &str,
        user_id: UserId,
        action: &str,
    ) -> Result<Reservation, IdempotencyError> {
        let now = Utc::now();

        let record = idempotency_keys::ActiveModel {
            key: Set(key.to_string()),
            user_id: Set(user_id.into_inner()),
            action: Set(action.to_string()),
            response_status: Set(None),
            response_body: Set(None),
            created_at: Set(now.into()),
            expires_at: Set(self.expiry(now).into()),
        };

        let inserted = idempotency_keys::Entity::insert(record)
            .on_conflict(
                OnConflict::column(idempotency_keys::Column::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        if inserted == 1 {
            return Ok(Reservation::Fresh);
        }

        let Some(existing) = idempotency_keys::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?
        else {
            // Purged between the insert and the read.
            return Err(IdempotencyError::InFlight);
        };

        if existing.user_id != user_id.into_inner() || existing.action != action {
            return Err(IdempotencyError::KeyMismatch);
        }

        if existing.expires_at <= now {
            return self.reclaim(&existing, now).await;
        }

        match existing.response_status {
            Some(status) => Ok(Reservation::Replay {
                status: u16::try_from(status).unwrap_or(500),
                body: existing.response_body.unwrap_or(Value::Null),
            }),
            None => Err(IdempotencyError::InFlight),
        }
    }

    /// Takes over an expired key. Only one concurrent caller wins.
    async fn reclaim(
        &self,
        existing: &idempotency_keys::Model,
        now: DateTime<Utc>,
    ) -> Result<Reservation, IdempotencyError> {
        let result = idempotency_keys::Entity::update_many()
            .col_expr(idempotency_keys::Column::ResponseStatus, Expr::value(Option::<i16>::None))
            .col_expr(
                idempotency_keys::Column::ResponseBody,
                Expr::value(Option::<Value>::None),
            )
            .col_expr(idempotency_keys::Column::CreatedAt, Expr::value(now))
            .col_expr(idempotency_keys::Column::ExpiresAt, Expr::value(self.expiry(now)))
            .filter(idempotency_keys::Column::Key.eq(&existing.key))
            .filter(idempotency_keys::Column::ExpiresAt.eq(existing.expires_at))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 1 {
            debug!(target: "idempotency", key = %existing.key, "Expired key reclaimed");
            Ok(Reservation::Fresh)
        } else {
            Err(IdempotencyError::InFlight)
        }
    }

    /// Stores the response of a finished operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn complete(&self, key: &str, status: u16, body: &Value) -> Result<(), DbErr> {
        idempotency_keys::Entity::update_many()
            .col_expr(
                idempotency_keys::Column::ResponseStatus,
                Expr::value(i16::try_from(status).unwrap_or(i16::MAX)),
            )
            .col_expr(idempotency_keys::Column::ResponseBody, Expr::value(body.clone()))
            .filter(idempotency_keys::Column::Key.eq(key))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Drops an in-flight reservation after the operation failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn release(&self, key: &str) -> Result<(), DbErr> {
        idempotency_keys::Entity::delete_many()
            .filter(idempotency_keys::Column::Key.eq(key))
            .filter(idempotency_keys::Column::ResponseStatus.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Deletes expired keys. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = idempotency_keys::Entity::delete_many()
            .filter(idempotency_keys::Column::ExpiresAt.lt(Utc::now()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(IdempotencyError::InFlight.http_status_code(), 409);
        assert_eq!(IdempotencyError::KeyMismatch.http_status_code(), 422);
        assert_eq!(
            IdempotencyError::KeyMismatch.error_code(),
            "IDEMPOTENCY_KEY_MISMATCH"
        );
    }

    #[test]
    fn test_expiry_saturates() {
        let repo = IdempotencyRepository::new(
            DatabaseConnection::Disconnected,
            Duration::from_secs(u64::MAX),
        );
        assert_eq!(repo.expiry(Utc::now()), DateTime::<Utc>::MAX_UTC);

        let repo =
            IdempotencyRepository::new(DatabaseConnection::Disconnected, Duration::from_secs(60));
        let now = Utc::now();
        assert_eq!(repo.expiry(now) - now, chrono::Duration::seconds(60));
    }
}
