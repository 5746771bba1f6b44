/// Outbox dispatcher
///
/// The main worker loop: polls the outbox, hands each job to the handler
/// that performs its kind and records the outcome.
///
/// # Architecture
///
/// ```text
/// Dispatcher
///   ├─> OutboxQueue: release stale rows, claim due jobs
///   ├─> JobHandler: perform the job (bounded by a per-job timeout)
///   └─> OutboxQueue: mark_done / mark_failed / abandon
/// ```
///
/// # Concurrency
///
/// Every claimed job runs in its own Tokio task. A semaphore with
/// `max_concurrent_jobs` permits caps how many run at once, and a poll never
/// claims more jobs than there are free permits.
///
/// # Example
///
/// ```no_run
/// use altruvist_worker::{config::WorkerConfig, dispatcher::Dispatcher, queue::OutboxQueue};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let dispatcher = Dispatcher::new(OutboxQueue::new(pool), WorkerConfig::default());
/// let shutdown = dispatcher.shutdown_token();
///
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
///
/// dispatcher.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::config::WorkerConfig;
use crate::handlers::JobHandler;
use crate::queue::OutboxQueue;
use altruvist_shared::models::outbox::OutboxJob;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Time given to running jobs once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    queue: OutboxQueue,
    handlers: Vec<Arc<dyn JobHandler>>,
    config: WorkerConfig,
    slots: Arc<Semaphore>,
    shutdown_token: CancellationToken,
}

impl Dispatcher {
    pub fn new(queue: OutboxQueue, config: WorkerConfig) -> Self {
        Self {
            queue,
            handlers: Vec::new(),
            slots: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn JobHandler>) {
        tracing::info!(handler = %handler.name(), "Registering job handler");
        self.handlers.push(handler);
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    fn handler_for(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.iter().find(|h| h.handles(kind)).cloned()
    }

    /// Sleeps for `duration` unless shutdown starts first
    async fn idle(&self, duration: Duration) {
        tokio::select! {
            _ = sleep(duration) => {}
            _ = self.shutdown_token.cancelled() => {}
        }
    }

    /// Runs until the shutdown token is cancelled, then waits up to
    /// 30 seconds for running jobs.
    ///
    /// # Errors
    ///
    /// Only fails if the concurrency semaphore is closed.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            batch_size = self.config.batch_size,
            "Outbox dispatcher starting"
        );

        if let Err(e) = self.queue.release_stale(self.config.stale_after()).await {
            tracing::error!(error = %e, "Failed to release stale jobs");
        }

        while !self.shutdown_token.is_cancelled() {
            let free = self.slots.available_permits().min(self.config.batch_size);
            if free == 0 {
                self.idle(Duration::from_millis(100)).await;
                continue;
            }

            let jobs = match self.queue.claim(free).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim outbox jobs");
                    self.idle(self.config.poll_interval()).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                self.idle(self.config.poll_interval()).await;
                continue;
            }

            for job in jobs {
                let permit = self.slots.clone().acquire_owned().await?;
                self.dispatch(job, permit);
            }
        }

        self.drain().await;
        tracing::info!("Outbox dispatcher stopped");
        Ok(())
    }

    fn dispatch(&self, job: OutboxJob, permit: OwnedSemaphorePermit) {
        let handler = self.handler_for(&job.kind);
        let queue = self.queue.clone();
        let job_timeout = self.config.job_timeout();
        let max_attempts = self.config.max_attempts;

        tokio::spawn(async move {
            execute_job(job, handler, queue, job_timeout, max_attempts).await;
            drop(permit);
        });
    }

    async fn drain(&self) {
        let total = self.config.max_concurrent_jobs as u32;
        match timeout(SHUTDOWN_GRACE, self.slots.acquire_many(total)).await {
            Ok(_) => tracing::info!("All running jobs finished"),
            Err(_) => tracing::warn!(
                running = self.config.max_concurrent_jobs - self.slots.available_permits(),
                "Shutting down with jobs still running"
            ),
        }
    }
}

/// Performs one job and records the outcome.
///
/// Jobs without a handler, jobs whose payload does not decode and
/// non-retryable failures are abandoned. Other failures and timeouts count
/// as a failed attempt.
async fn execute_job(
    job: OutboxJob,
    handler: Option<Arc<dyn JobHandler>>,
    queue: OutboxQueue,
    job_timeout: Duration,
    max_attempts: i32,
) {
    let job_id = job.id;

    let Some(handler) = handler else {
        tracing::error!(job_id = %job_id, kind = %job.kind, "No handler for job kind");
        if let Err(e) = queue
            .abandon(job_id, &format!("No handler for job kind {}", job.kind))
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Failed to abandon job");
        }
        return;
    };

    let payload = match job.decode_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(job_id = %job_id, kind = %job.kind, error = %e, "Malformed job payload");
            if let Err(e) = queue
                .abandon(job_id, &format!("Malformed payload: {e}"))
                .await
            {
                tracing::error!(job_id = %job_id, error = %e, "Failed to abandon job");
            }
            return;
        }
    };

    tracing::debug!(
        job_id = %job_id,
        kind = %job.kind,
        handler = %handler.name(),
        attempt = job.attempts,
        "Executing outbox job"
    );

    let outcome = match timeout(job_timeout, handler.handle(&payload)).await {
        Ok(Ok(())) => queue.mark_done(job_id).await,
        Ok(Err(e)) if !e.is_retryable() => queue.abandon(job_id, &e.to_string()).await,
        Ok(Err(e)) => queue
            .mark_failed(job_id, &e.to_string(), max_attempts)
            .await
            .map(|_| ()),
        Err(_) => queue
            .mark_failed(
                job_id,
                &format!("Timed out after {}s", job_timeout.as_secs()),
                max_attempts,
            )
            .await
            .map(|_| ()),
    };

    if let Err(e) = outcome {
        tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
    }
}
