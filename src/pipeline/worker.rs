//! Worker loop that claims durable jobs and runs them through their handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{LimitsConfig, WorkerConfig};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Job, JobKind};

use super::limits::{ConcurrencyLimiter, JobPermit};
use super::steps::StepContext;

/// Longest single wait for a rescheduled job while draining the queue.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(30);

/// Context handed to a handler for one attempt of a job.
pub struct JobContext {
    pub job: Job,
    pub steps: StepContext,
}

impl JobContext {
    pub fn new(job: Job, steps: StepContext) -> Self {
        Self { job, steps }
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.job.payload.clone()).map_err(|e| {
            AppError::Invalid(format!("bad {} payload for job {}: {}", self.job.kind, self.job.id, e))
        })
    }

    /// Whether this attempt is the last one the job gets.
    pub fn is_last_attempt(&self) -> bool {
        !self.job.has_attempts_left()
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn execute(&self, ctx: &JobContext) -> Result<()>;

    /// Runs once when the job fails for good: a permanent error, or a
    /// transient one with no attempts left. Must not fail itself.
    async fn on_failure(&self, _ctx: &JobContext, _error: &AppError) {}
}

#[derive(Clone)]
pub struct Worker {
    repo: Repository,
    handlers: Arc<HashMap<JobKind, Arc<dyn JobHandler>>>,
    limiter: Arc<ConcurrencyLimiter>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        repo: Repository,
        config: WorkerConfig,
        limits: LimitsConfig,
        handlers: Vec<Arc<dyn JobHandler>>,
    ) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.kind(), h)).collect();
        Self {
            repo,
            handlers: Arc::new(handlers),
            limiter: Arc::new(ConcurrencyLimiter::new(limits)),
            config,
        }
    }

    /// Return jobs left running by a previous process to the queue.
    pub async fn recover(&self) -> Result<usize> {
        let requeued = self.repo.requeue_running_jobs().await?;
        if requeued > 0 {
            warn!(requeued, "Requeued jobs interrupted by a previous shutdown");
        }
        Ok(requeued)
    }

    /// Process jobs until none are pending, including ones waiting on a
    /// retry backoff. Returns the number of attempts made.
    pub async fn run_until_idle(&self) -> Result<usize> {
        self.drive(std::future::pending::<()>(), true).await
    }

    /// Poll for jobs until `shutdown` resolves, then let in-flight jobs finish.
    pub async fn run<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        self.recover().await?;
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_in_flight = self.config.max_in_flight,
            "Job worker started"
        );
        self.drive(shutdown, false).await?;
        info!("Job worker stopped");
        Ok(())
    }

    /// Keep up to `max_in_flight` jobs running, claiming a new one whenever a
    /// slot frees up. Jobs whose owner or kind is at its cap are left pending
    /// so they never hold a slot another owner could use.
    async fn drive<S>(&self, shutdown: S, until_idle: bool) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let max_in_flight = self.config.max_in_flight.max(1);
        let mut tasks = JoinSet::new();
        let mut started = 0;
        let mut failure = None;

        tokio::pin!(shutdown);
        loop {
            while tasks.len() < max_in_flight {
                match self.claim().await {
                    Ok(Some((job, permit))) => {
                        started += 1;
                        let worker = self.clone();
                        tasks.spawn(async move { worker.execute_job(job, permit).await });
                    }
                    Ok(None) => break,
                    Err(e) if until_idle => {
                        failure = Some(e);
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to claim jobs");
                        break;
                    }
                }
            }
            if failure.is_some() {
                break;
            }

            let wait = if tasks.is_empty() && until_idle {
                match self.repo.next_pending_due().await? {
                    Some(due) => (due - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO)
                        .min(MAX_IDLE_WAIT),
                    None => return Ok(started),
                }
            } else {
                poll_interval
            };

            tokio::select! {
                _ = &mut shutdown => break,
                Some(result) = tasks.join_next(), if !tasks.is_empty() => log_join(result),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight jobs");
        }
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(started),
        }
    }

    /// Claim the next due job that has a free slot, taking the slot with it.
    async fn claim(&self) -> Result<Option<(Job, Option<JobPermit>)>> {
        let busy = self.limiter.saturated()?;
        let Some(job) = self.repo.claim_next_job_except(Utc::now(), &busy).await? else {
            return Ok(None);
        };
        let permit = self.limiter.try_acquire(job.kind, job.owner_id.as_ref())?;
        debug!(job_id = %job.id, kind = %job.kind, slot_ready = permit.is_some(), "Claimed job");
        Ok(Some((job, permit)))
    }

    async fn execute_job(&self, job: Job, permit: Option<JobPermit>) {
        let start = Instant::now();
        let job_id = job.id.clone();
        let kind = job.kind;

        let Some(handler) = self.handlers.get(&kind).cloned() else {
            warn!(%job_id, %kind, "No handler registered for job kind");
            self.record(self.repo.fail_job(&job_id, &format!("no handler for {}", kind)).await, &job_id);
            return;
        };

        let _permit = match permit {
            Some(permit) => permit,
            None => match self.limiter.acquire(kind, job.owner_id.as_ref()).await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(%job_id, error = %e, "Failed to acquire job slot");
                    let retry_at = Utc::now() + chrono::Duration::milliseconds(self.config.retry_backoff_ms as i64);
                    self.record(self.repo.reschedule_job(&job_id, &e.to_string(), retry_at).await, &job_id);
                    return;
                }
            },
        };

        info!(%job_id, %kind, attempt = job.attempts, max_attempts = job.max_attempts, "Processing job");
        let ctx = JobContext::new(job, StepContext::new(self.repo.clone(), job_id.clone()));

        match handler.execute(&ctx).await {
            Ok(()) => {
                self.record(self.repo.complete_job(&job_id).await, &job_id);
                info!(
                    %job_id,
                    %kind,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
            }
            Err(e) if e.is_retriable() && !ctx.is_last_attempt() => {
                let delay = self.backoff(ctx.job.attempts);
                warn!(
                    %job_id,
                    %kind,
                    attempt = ctx.job.attempts,
                    retry_in_ms = delay.num_milliseconds(),
                    error = %e,
                    "Job failed, will retry"
                );
                self.record(
                    self.repo.reschedule_job(&job_id, &e.to_string(), Utc::now() + delay).await,
                    &job_id,
                );
            }
            Err(e) => {
                if e.is_retriable() {
                    error!(%job_id, %kind, attempts = ctx.job.attempts, error = %e, "Job failed, retries exhausted");
                } else {
                    warn!(%job_id, %kind, error = %e, "Job failed permanently");
                }
                self.record(self.repo.fail_job(&job_id, &e.to_string()).await, &job_id);
                handler.on_failure(&ctx, &e).await;
            }
        }
    }

    /// `retry_backoff_ms * 2^(attempt - 1)`.
    fn backoff(&self, attempt: u32) -> chrono::Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ms = self.config.retry_backoff_ms.saturating_mul(1u64 << exponent);
        chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
    }

    fn record(&self, result: Result<()>, job_id: &str) {
        if let Err(e) = result {
            error!(%job_id, error = %e, "Failed to update job state");
        }
    }
}

fn log_join(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = ?e, "Job task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, NewJob};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        failures: AtomicUsize,
        fail_times: usize,
        permanent: bool,
    }

    impl Flaky {
        fn new(fail_times: usize, permanent: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                fail_times,
                permanent,
            })
        }
    }

    #[async_trait]
    impl JobHandler for Flaky {
        fn kind(&self) -> JobKind {
            JobKind::Extract
        }

        async fn execute(&self, ctx: &JobContext) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.steps.run("first", || async { Ok(call) }).await?;
            if call < self.fail_times {
                return Err(if self.permanent {
                    AppError::NotFound("article 1".into())
                } else {
                    AppError::GenerativeApi("overloaded".into())
                });
            }
            Ok(())
        }

        async fn on_failure(&self, _ctx: &JobContext, _error: &AppError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 5,
            max_in_flight: 4,
            retry_backoff_ms: 1,
        }
    }

    async fn enqueue(repo: &Repository, max_attempts: u32) -> String {
        repo.enqueue_job(NewJob {
            kind: JobKind::Extract,
            owner_id: None,
            payload: serde_json::json!({}),
            max_attempts,
            dedupe_key: None,
        })
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_succeed() {
        let repo = Repository::in_memory().await.unwrap();
        let handler = Flaky::new(2, false);
        let worker = Worker::new(repo.clone(), fast_config(), LimitsConfig::default(), vec![handler.clone()]);
        let id = enqueue(&repo, 3).await;

        let attempts = worker.run_until_idle().await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(repo.get_job(&id).await.unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(handler.failures.load(Ordering::SeqCst), 0);
        // The memoized step kept its first result across attempts.
        assert_eq!(repo.get_step_result(&id, "first").await.unwrap().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_run_finalizer_once() {
        let repo = Repository::in_memory().await.unwrap();
        let handler = Flaky::new(usize::MAX, false);
        let worker = Worker::new(repo.clone(), fast_config(), LimitsConfig::default(), vec![handler.clone()]);
        let id = enqueue(&repo, 2).await;

        worker.run_until_idle().await.unwrap();
        let job = repo.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(handler.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let repo = Repository::in_memory().await.unwrap();
        let handler = Flaky::new(usize::MAX, true);
        let worker = Worker::new(repo.clone(), fast_config(), LimitsConfig::default(), vec![handler.clone()]);
        let id = enqueue(&repo, 5).await;

        worker.run_until_idle().await.unwrap();
        let job = repo.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_job_without_handler_fails() {
        let repo = Repository::in_memory().await.unwrap();
        let worker = Worker::new(repo.clone(), fast_config(), LimitsConfig::default(), vec![]);
        let id = enqueue(&repo, 3).await;

        worker.run_until_idle().await.unwrap();
        assert_eq!(repo.get_job(&id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    struct Timed {
        started: Instant,
        finished: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for Timed {
        fn kind(&self) -> JobKind {
            JobKind::Import
        }

        async fn execute(&self, ctx: &JobContext) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let owner = ctx.job.owner_id.as_ref().map(|o| o.to_string()).unwrap_or_default();
            self.finished.lock().unwrap().push(owner);
            Ok(())
        }
    }

    async fn enqueue_import(repo: &Repository, owner: &str) -> String {
        repo.enqueue_job(NewJob {
            kind: JobKind::Import,
            owner_id: Some(crate::models::OwnerId::new(owner)),
            payload: serde_json::json!({ "owner_id": owner }),
            max_attempts: 1,
            dedupe_key: None,
        })
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_backlog_of_one_owner_does_not_delay_another() {
        let repo = Repository::in_memory().await.unwrap();
        let handler = Arc::new(Timed {
            started: Instant::now(),
            finished: std::sync::Mutex::new(Vec::new()),
        });
        let worker = Worker::new(repo.clone(), fast_config(), LimitsConfig::default(), vec![handler.clone()]);
        for _ in 0..5 {
            enqueue_import(&repo, "a").await;
        }

        let running = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run_until_idle().await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let late = enqueue_import(&repo, "b").await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // One import per owner at a time; the rest of a's backlog stays queued.
        let jobs = repo.list_jobs(Some(JobKind::Import)).await.unwrap();
        let running_now = jobs.iter().filter(|j| j.status == JobStatus::Running).count();
        assert_eq!(running_now, 2);
        assert_eq!(repo.get_job(&late).await.unwrap().unwrap().status, JobStatus::Running);

        assert_eq!(running.await.unwrap(), 6);
        let finished = handler.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 6);
        assert_eq!(finished[1], "b", "b finished behind a's whole backlog: {:?}", finished);
        assert!(handler.started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let repo = Repository::in_memory().await.unwrap();
        let worker = Worker::new(repo, fast_config(), LimitsConfig::default(), vec![]);
        worker
            .run(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();
    }

    #[test]
    fn test_backoff_doubles() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let repo = rt.block_on(Repository::in_memory()).unwrap();
        let worker = Worker::new(
            repo,
            WorkerConfig {
                retry_backoff_ms: 2_000,
                ..WorkerConfig::default()
            },
            LimitsConfig::default(),
            vec![],
        );
        assert_eq!(worker.backoff(1).num_milliseconds(), 2_000);
        assert_eq!(worker.backoff(2).num_milliseconds(), 4_000);
        assert_eq!(worker.backoff(3).num_milliseconds(), 8_000);
    }
}
