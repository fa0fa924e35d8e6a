//! Worker pool.
//!
//! Each worker loops: lease a job, deliver it, then ack, retry with backoff,
//! or dead-letter. Workers share nothing but the queue. A separate loop
//! hands back jobs whose lease expired because their worker died.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use sea_orm::DbErr;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use rampart_core::delivery::{BackoffPolicy, RetryDecision, decide};
use rampart_shared::config::DeliveryConfig;
use rampart_shared::types::DeliveryJobId;

use crate::sender::WebhookSender;
use crate::store::JobStore;

/// Pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Lease after which an active job is handed back.
    pub lease_timeout: Duration,
    /// Retry backoff.
    pub backoff: BackoffPolicy,
}

impl WorkerSettings {
    /// Settings from the `delivery` config section.
    #[must_use]
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
            lease_timeout: config.lease_timeout(),
            backoff: BackoffPolicy::new(
                config.base_delay_ms,
                config.max_delay_ms,
                config.jitter_ms,
            ),
        }
    }
}

/// What happened to one leased job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Delivered and acked.
    Delivered,
    /// Failed and scheduled again.
    Retried,
    /// Moved to the DLQ.
    DeadLettered,
}

/// Fixed-size delivery worker pool.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    sender: WebhookSender,
    settings: WorkerSettings,
}

impl WorkerPool {
    /// Creates a pool over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, sender: WebhookSender, settings: WorkerSettings) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    /// Runs the workers and the lease-recovery loop until `shutdown` flips
    /// to `true`. In-flight deliveries finish before this returns.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(
            target: "delivery",
            concurrency = self.settings.concurrency,
            poll_interval_ms = self.settings.poll_interval.as_millis(),
            "Delivery worker pool started"
        );

        let mut tasks: Vec<_> = (0..self.settings.concurrency)
            .map(|worker| tokio::spawn(Arc::clone(&self).worker_loop(worker, shutdown.clone())))
            .collect();
        tasks.push(tokio::spawn(Arc::clone(&self).recovery_loop(shutdown)));

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(target: "delivery", error = %e, "Delivery task panicked");
            }
        }

        info!(target: "delivery", "Delivery worker pool stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next().await {
                // More work may be waiting.
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(target: "delivery", worker, error = %e, "Queue operation failed"),
            }

            if !idle(&mut shutdown, self.settings.poll_interval).await {
                break;
            }
        }
        debug!(target: "delivery", worker, "Worker stopped");
    }

    async fn recovery_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = (self.settings.lease_timeout / 2).max(Duration::from_secs(1));
        loop {
            if !idle(&mut shutdown, period).await {
                break;
            }
            match self.store.recover_stale(self.settings.lease_timeout).await {
                Ok(0) => {}
                Ok(recovered) => {
                    warn!(target: "delivery", recovered, "Recovered jobs with expired leases");
                }
                Err(e) => error!(target: "delivery", error = %e, "Lease recovery failed"),
            }
        }
    }

    /// Leases and processes one job. Returns `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a queue operation fails; the job then stays
    /// leased until lease recovery returns it.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, DbErr> {
        let Some(job) = self.store.claim_next().await? else {
            return Ok(None);
        };
        let id = DeliveryJobId::from_uuid(job.id);

        let Err(failure) = self.sender.send(&job).await else {
            self.store.complete(id).await?;
            info!(
                target: "delivery",
                job_key = %job.job_key,
                token = %job.token,
                attempts = job.attempts,
                "Delivery succeeded"
            );
            return Ok(Some(JobOutcome::Delivered));
        };

        let attempts = u32::try_from(job.attempts).unwrap_or(0);
        let max_attempts = u32::try_from(job.max_attempts).unwrap_or(1);
        let jitter_sample: u64 = rand::rng().random();
        let reason = failure.to_string();

        match decide(&failure, attempts, max_attempts, &self.settings.backoff, jitter_sample) {
            RetryDecision::Retry { delay } => {
                self.store.retry(id, delay, &reason).await?;
                warn!(
                    target: "delivery",
                    job_key = %job.job_key,
                    attempts,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %reason,
                    "Delivery failed, retry scheduled"
                );
                Ok(Some(JobOutcome::Retried))
            }
            RetryDecision::DeadLetter { class } => {
                let dlq_job_id = self.store.dead_letter(&job, &reason, class).await?;
                error!(
                    target: "delivery",
                    job_key = %job.job_key,
                    dlq_job_id = %dlq_job_id,
                    failure_class = class.as_str(),
                    attempts,
                    error = %reason,
                    "Delivery dead-lettered"
                );
                Ok(Some(JobOutcome::DeadLettered))
            }
        }
    }
}

/// Waits `period` or until shutdown. Returns false once shutdown is requested.
async fn idle(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(period) => !*shutdown.borrow(),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
