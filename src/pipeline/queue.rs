use crate::config::LimitsConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::models::NewJob;

use super::events::PipelineEvent;

/// Turns events into durable job rows.
#[derive(Clone)]
pub struct JobQueue {
    repo: Repository,
    limits: LimitsConfig,
}

impl JobQueue {
    pub fn new(repo: Repository, limits: LimitsConfig) -> Self {
        Self { repo, limits }
    }

    /// Queue `event`, returning the job id.
    pub async fn send(&self, event: PipelineEvent) -> Result<String> {
        let (id, _) = self.enqueue(event, None).await?;
        Ok(id)
    }

    /// Queue `event` unless a job with `dedupe_key` was ever queued.
    /// Returns the job id and whether it was newly queued.
    pub async fn send_once(&self, event: PipelineEvent, dedupe_key: String) -> Result<(String, bool)> {
        self.enqueue(event, Some(dedupe_key)).await
    }

    async fn enqueue(&self, event: PipelineEvent, dedupe_key: Option<String>) -> Result<(String, bool)> {
        let kind = event.kind();
        let job = NewJob {
            kind,
            owner_id: event.owner().cloned(),
            payload: event.payload()?,
            max_attempts: self.limits.get(kind).max_attempts(),
            dedupe_key,
        };
        let (id, inserted) = self.repo.enqueue_job(job).await?;
        if inserted {
            tracing::debug!(job_id = %id, event = event.name(), "Queued job");
        } else {
            tracing::debug!(job_id = %id, event = event.name(), "Job already queued");
        }
        Ok((id, inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobKind, OwnerId};
    use crate::pipeline::events::{ImportRequested, WeeklyDigestRequested};

    #[tokio::test]
    async fn test_max_attempts_follow_retry_limits() {
        let repo = Repository::in_memory().await.unwrap();
        let queue = JobQueue::new(repo.clone(), LimitsConfig::default());

        let id = queue
            .send(PipelineEvent::ImportRequested(ImportRequested {
                owner_id: OwnerId::new("alice"),
                collection_id: None,
            }))
            .await
            .unwrap();

        let job = repo.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.kind, JobKind::Import);
        assert_eq!(job.max_attempts, 4);
        assert_eq!(job.owner_id, Some(OwnerId::new("alice")));
    }

    #[tokio::test]
    async fn test_send_once_dedupes() {
        let repo = Repository::in_memory().await.unwrap();
        let queue = JobQueue::new(repo.clone(), LimitsConfig::default());
        let event = PipelineEvent::WeeklyDigestRequested(WeeklyDigestRequested {
            owner_id: None,
            period_start: None,
        });

        let (a, first) = queue.send_once(event.clone(), "weekly:2026-10-05".into()).await.unwrap();
        let (b, second) = queue.send_once(event, "weekly:2026-10-05".into()).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(a, b);
    }
}
