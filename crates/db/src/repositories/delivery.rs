//! Delivery queue backed by the `delivery_jobs` table.
//!
//! Workers lease jobs with `FOR UPDATE SKIP LOCKED`, so concurrent workers
//! never receive the same job. Every state transition is one statement or
//! one transaction; a worker that dies mid-delivery leaves an `active` job
//! that stale-lease recovery returns to `waiting`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rampart_core::delivery::{DEFAULT_SOURCE_QUEUE, FailureClass};
use rampart_shared::types::{DeliveryJobId, DlqJobId};

use crate::entities::{delivery_jobs, dlq_jobs, sea_orm_active_enums::DeliveryJobState};

/// Error types for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Neither the job nor the queue defaults name a target URL.
    #[error("No delivery URL given and no default configured")]
    NoTargetUrl,

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl QueueError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoTargetUrl => "NO_TARGET_URL",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NoTargetUrl => 400,
            Self::Database(_) => 500,
        }
    }
}

/// Values applied to jobs that do not specify their own.
#[derive(Debug, Clone)]
pub struct QueueDefaults {
    /// Signing secret.
    pub secret: String,
    /// Target URL.
    pub default_url: Option<String>,
    /// Attempt budget per job.
    pub max_attempts: u32,
}

/// A job to enqueue.
#[derive(Debug, Clone, Default)]
pub struct NewDelivery {
    /// Dedup key; defaults to `<token>:<webhook_event_id>`.
    pub job_key: Option<String>,
    /// Transaction token the delivery is about.
    pub token: String,
    /// Target URL; defaults to the queue's default.
    pub url: Option<String>,
    /// Signing secret; defaults to the queue's secret.
    pub secret: Option<String>,
    /// Body sent to the target.
    pub payload: Value,
    /// Event id sent as `X-Webhook-Id`; minted when absent.
    pub webhook_event_id: Option<String>,
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    /// Job row id.
    pub id: DeliveryJobId,
    /// Dedup key.
    pub job_key: String,
    /// Event id the delivery carries.
    pub webhook_event_id: String,
    /// False if a job with the same key already existed.
    pub created: bool,
}

/// Mints a fresh webhook event id.
#[must_use]
pub fn new_webhook_event_id() -> String {
    format!("evt_{}", Uuid::now_v7().simple())
}

/// Handle to the delivery queue.
///
/// Constructed once at startup and shared by the HTTP layer, the DLQ store
/// and the worker pool.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    db: DatabaseConnection,
    defaults: QueueDefaults,
}

impl DeliveryQueue {
    /// Creates a new queue handle.
    #[must_use]
    pub const fn new(db: DatabaseConnection, defaults: QueueDefaults) -> Self {
        Self { db, defaults }
    }

    /// Returns the queue defaults.
    #[must_use]
    pub const fn defaults(&self) -> &QueueDefaults {
        &self.defaults
    }

    /// Enqueues a job. A job whose key already exists is not duplicated.
    ///
    /// # Errors
    ///
    /// Returns `NoTargetUrl` or a database error.
    pub async fn enqueue(&self, job: NewDelivery) -> Result<Enqueued, QueueError> {
        self.enqueue_in(&self.db, job).await
    }

    /// Enqueues a job on `conn`, typically an open transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoTargetUrl` or a database error.
    pub async fn enqueue_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        job: NewDelivery,
    ) -> Result<Enqueued, QueueError> {
        let url = job
            .url
            .or_else(|| self.defaults.default_url.clone())
            .ok_or(QueueError::NoTargetUrl)?;
        let webhook_event_id = job.webhook_event_id.unwrap_or_else(new_webhook_event_id);
        let job_key = job
            .job_key
            .unwrap_or_else(|| format!("{}:{webhook_event_id}", job.token));
        let now = Utc::now();
        let id = DeliveryJobId::new();

        let row = delivery_jobs::ActiveModel {
            id: Set(id.into_inner()),
            job_key: Set(job_key.clone()),
            token: Set(job.token.clone()),
            url: Set(url),
            secret: Set(job.secret.unwrap_or_else(|| self.defaults.secret.clone())),
            payload: Set(job.payload),
            webhook_event_id: Set(webhook_event_id.clone()),
            state: Set(DeliveryJobState::Waiting),
            attempts: Set(0),
            max_attempts: Set(i32::try_from(self.defaults.max_attempts.max(1)).unwrap_or(i32::MAX)),
            run_at: Set(now.into()),
            leased_at: Set(None),
            last_error: Set(None),
            completed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let inserted = delivery_jobs::Entity::insert(row)
            .on_conflict(
                OnConflict::column(delivery_jobs::Column::JobKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if inserted == 1 {
            info!(
                target: "delivery",
                job_key = %job_key,
                token = %job.token,
                webhook_event_id = %webhook_event_id,
                "Delivery enqueued"
            );
            return Ok(Enqueued {
                id,
                job_key,
                webhook_event_id,
                created: true,
            });
        }

        let existing = delivery_jobs::Entity::find()
            .filter(delivery_jobs::Column::JobKey.eq(&job_key))
            .one(conn)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!("delivery job {job_key} vanished after conflict"))
            })?;

        debug!(target: "delivery", job_key = %job_key, "Delivery already enqueued");
        Ok(Enqueued {
            id: DeliveryJobId::from_uuid(existing.id),
            job_key,
            webhook_event_id: existing.webhook_event_id,
            created: false,
        })
    }

    /// Leases the next runnable job, incrementing its attempt count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn claim_next(&self) -> Result<Option<delivery_jobs::Model>, DbErr> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let Some(job) = delivery_jobs::Entity::find()
            .filter(delivery_jobs::Column::State.eq(DeliveryJobState::Waiting))
            .filter(delivery_jobs::Column::RunAt.lte(now))
            .order_by_asc(delivery_jobs::Column::RunAt)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?
        else {
            txn.commit().await?;
            return Ok(None);
        };

        let attempts = job.attempts + 1;
        let mut active = job.into_active_model();
        active.state = Set(DeliveryJobState::Active);
        active.attempts = Set(attempts);
        active.leased_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        let leased = active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(leased))
    }

    /// Marks an active job delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn complete(&self, id: DeliveryJobId) -> Result<(), DbErr> {
        let now = Utc::now();
        delivery_jobs::Entity::update_many()
            .set(delivery_jobs::ActiveModel {
                state: Set(DeliveryJobState::Completed),
                leased_at: Set(None),
                last_error: Set(None),
                completed_at: Set(Some(now.into())),
                updated_at: Set(now.into()),
                ..Default::default()
            })
            .filter(delivery_jobs::Column::Id.eq(id.into_inner()))
            .filter(delivery_jobs::Column::State.eq(DeliveryJobState::Active))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Returns an active job to `waiting`, runnable after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn retry(&self, id: DeliveryJobId, delay: Duration, error: &str) -> Result<(), DbErr> {
        let now = Utc::now();
        let run_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);

        delivery_jobs::Entity::update_many()
            .set(delivery_jobs::ActiveModel {
                state: Set(DeliveryJobState::Waiting),
                run_at: Set(run_at.into()),
                leased_at: Set(None),
                last_error: Set(Some(error.to_string())),
                updated_at: Set(now.into()),
                ..Default::default()
            })
            .filter(delivery_jobs::Column::Id.eq(id.into_inner()))
            .filter(delivery_jobs::Column::State.eq(DeliveryJobState::Active))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Moves a job into the DLQ and removes it from the queue, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn dead_letter(
        &self,
        job: &delivery_jobs::Model,
        failure_reason: &str,
        failure_class: FailureClass,
    ) -> Result<DlqJobId, DbErr> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let id = DlqJobId::new();

        dlq_jobs::ActiveModel {
            id: Set(id.into_inner()),
            source_queue: Set(DEFAULT_SOURCE_QUEUE.to_string()),
            source_job_id: Set(job.job_key.clone()),
            token: Set(job.token.clone()),
            url: Set(job.url.clone()),
            secret: Set(job.secret.clone()),
            payload: Set(job.payload.clone()),
            webhook_event_id: Set(job.webhook_event_id.clone()),
            failure_reason: Set(failure_reason.to_string()),
            failure_class: Set(failure_class.into()),
            failed_at: Set(now.into()),
            attempts: Set(job.attempts),
            archived_at: Set(None),
            archived_by: Set(None),
            archive_reason: Set(None),
            replay_count: Set(0),
            replay_history: Set(Value::Array(Vec::new())),
            last_replayed_at: Set(None),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        delivery_jobs::Entity::delete_by_id(job.id).exec(&txn).await?;
        txn.commit().await?;

        warn!(
            target: "delivery",
            job_key = %job.job_key,
            token = %job.token,
            dlq_job_id = %id,
            attempts = job.attempts,
            failure_class = failure_class.as_str(),
            failure_reason,
            "Delivery moved to DLQ"
        );
        Ok(id)
    }

    /// Returns jobs leased before `now - lease` to `waiting`.
    ///
    /// The attempt taken by the dead lease is given back.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn recover_stale(&self, lease: Duration) -> Result<u64, DbErr> {
        let now = Utc::now();
        let cutoff: DateTime<Utc> = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);

        let result = delivery_jobs::Entity::update_many()
            .set(delivery_jobs::ActiveModel {
                state: Set(DeliveryJobState::Waiting),
                leased_at: Set(None),
                run_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            })
            .col_expr(
                delivery_jobs::Column::Attempts,
                Expr::cust("GREATEST(\"attempts\" - 1, 0)"),
            )
            .filter(delivery_jobs::Column::State.eq(DeliveryJobState::Active))
            .filter(delivery_jobs::Column::LeasedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            warn!(
                target: "delivery",
                recovered = result.rows_affected,
                "Recovered deliveries with expired leases"
            );
        }
        Ok(result.rows_affected)
    }

    /// Finds a job by dedup key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_key(&self, job_key: &str) -> Result<Option<delivery_jobs::Model>, DbErr> {
        delivery_jobs::Entity::find()
            .filter(delivery_jobs::Column::JobKey.eq(job_key))
            .one(&self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        let a = new_webhook_event_id();
        let b = new_webhook_event_id();
        assert!(a.starts_with("evt_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_enqueue_without_url_fails_before_touching_db() {
        let queue = DeliveryQueue::new(
            DatabaseConnection::Disconnected,
            QueueDefaults {
                secret: "s".into(),
                default_url: None,
                max_attempts: 3,
            },
        );
        let err = queue
            .enqueue(NewDelivery {
                token: "tok".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NoTargetUrl));
    }
}
