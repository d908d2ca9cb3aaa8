use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Repository;
use crate::error::Result;

/// Durable step log of one job.
///
/// A step that completed on an earlier attempt returns its recorded result
/// instead of running again.
#[derive(Clone)]
pub struct StepContext {
    repo: Repository,
    job_id: String,
}

impl StepContext {
    pub fn new(repo: Repository, job_id: impl Into<String>) -> Self {
        Self {
            repo,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn run<T, F, Fut>(&self, name: &str, step: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cached(name).await? {
            tracing::debug!(job_id = %self.job_id, step = name, "Step already completed, reusing result");
            return Ok(value);
        }

        let value = step().await?;
        self.repo
            .save_step_result(&self.job_id, name, serde_json::to_string(&value)?)
            .await?;
        tracing::debug!(job_id = %self.job_id, step = name, "Step completed");
        Ok(value)
    }

    /// Result of `name` if it has already completed.
    pub async fn cached<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.repo.get_step_result(&self.job_id, name).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
