//! Queue operations used by the worker pool.

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DbErr;

use rampart_core::delivery::FailureClass;
use rampart_db::entities::delivery_jobs;
use rampart_db::DeliveryQueue;
use rampart_shared::types::{DeliveryJobId, DlqJobId};

/// A leased delivery job.
pub type DeliveryJob = delivery_jobs::Model;

/// Job-state transitions the pool performs.
///
/// Every method is a single statement or a single transaction, so a worker
/// that dies between two calls leaves the job leased until stale-lease
/// recovery hands it back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Leases the next runnable job, counting the attempt.
    async fn claim_next(&self) -> Result<Option<DeliveryJob>, DbErr>;

    /// Acks a delivered job.
    async fn complete(&self, id: DeliveryJobId) -> Result<(), DbErr>;

    /// Returns a job to the queue, runnable after `delay`.
    async fn retry(&self, id: DeliveryJobId, delay: Duration, error: &str) -> Result<(), DbErr>;

    /// Moves a job into the DLQ.
    async fn dead_letter(
        &self,
        job: &DeliveryJob,
        reason: &str,
        class: FailureClass,
    ) -> Result<DlqJobId, DbErr>;

    /// Hands back jobs leased longer than `lease`.
    async fn recover_stale(&self, lease: Duration) -> Result<u64, DbErr>;
}

#[async_trait]
impl JobStore for DeliveryQueue {
    async fn claim_next(&self) -> Result<Option<DeliveryJob>, DbErr> {
        Self::claim_next(self).await
    }

    async fn complete(&self, id: DeliveryJobId) -> Result<(), DbErr> {
        Self::complete(self, id).await
    }

    async fn retry(&self, id: DeliveryJobId, delay: Duration, error: &str) -> Result<(), DbErr> {
        Self::retry(self, id, delay, error).await
    }

    async fn dead_letter(
        &self,
        job: &DeliveryJob,
        reason: &str,
        class: FailureClass,
    ) -> Result<DlqJobId, DbErr> {
        Self::dead_letter(self, job, reason, class).await
    }

    async fn recover_stale(&self, lease: Duration) -> Result<u64, DbErr> {
        Self::recover_stale(self, lease).await
    }
}
