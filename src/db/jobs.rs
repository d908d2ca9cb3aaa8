use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ClaimFilter, Job, JobKind, JobStatus, NewJob, OwnerId};

use super::repository::{db_time, json_column, opt_time_column, parsed_column, time_column};
use super::Repository;

impl Repository {
    /// Queue a job. A job whose dedupe key is already present is not queued
    /// again; the existing job's id is returned instead.
    pub async fn enqueue_job(&self, job: NewJob) -> Result<(String, bool)> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&job.payload)?;
        let now = db_time(Utc::now());
        let result = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO jobs (id, kind, owner_id, payload, status, attempts, max_attempts,
                                         dedupe_key, run_after, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?7, ?7, ?7)
                       ON CONFLICT(dedupe_key) DO NOTHING"#,
                    params![
                        id,
                        job.kind.as_str(),
                        job.owner_id.as_ref().map(|o| o.as_str()),
                        payload,
                        job.max_attempts,
                        job.dedupe_key,
                        now,
                    ],
                )?;
                if inserted > 0 {
                    return Ok((id, true));
                }
                let existing: String = conn.query_row(
                    "SELECT id FROM jobs WHERE dedupe_key = ?1",
                    params![job.dedupe_key],
                    |row| row.get(0),
                )?;
                Ok((existing, false))
            })
            .await?;
        Ok(result)
    }

    /// Atomically take the oldest due pending job and mark it running.
    pub async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        self.claim_next_job_except(now, &ClaimFilter::default()).await
    }

    /// Like `claim_next_job`, passing over jobs the filter skips. Skipped
    /// jobs keep their place in the queue.
    pub async fn claim_next_job_except(&self, now: DateTime<Utc>, skip: &ClaimFilter) -> Result<Option<Job>> {
        let now = db_time(now);
        let skip = skip.clone();
        let job = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let chosen = {
                    let mut stmt = tx.prepare(
                        r#"SELECT id, kind, owner_id FROM jobs
                           WHERE status = 'pending' AND run_after <= ?1
                           ORDER BY run_after, created_at, rowid"#,
                    )?;
                    let mut rows = stmt.query(params![now])?;
                    let mut chosen: Option<String> = None;
                    while let Some(row) = rows.next()? {
                        let kind: String = row.get(1)?;
                        let owner: Option<String> = row.get(2)?;
                        if !skip.skips(&kind, owner.as_deref()) {
                            chosen = Some(row.get(0)?);
                            break;
                        }
                    }
                    chosen
                };

                let job = match chosen {
                    Some(id) => tx
                        .query_row(
                            &format!(
                                r#"UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?1
                                   WHERE id = ?2
                                   RETURNING {}"#,
                                JOB_COLUMNS
                            ),
                            params![now, id],
                            job_from_row,
                        )
                        .optional()?,
                    None => None,
                };
                tx.commit()?;
                Ok(job)
            })
            .await?;
        Ok(job)
    }

    pub async fn complete_job(&self, id: &str) -> Result<()> {
        self.set_job_state(id, JobStatus::Completed, None, None).await
    }

    pub async fn fail_job(&self, id: &str, error: &str) -> Result<()> {
        self.set_job_state(id, JobStatus::Failed, Some(error.to_string()), None)
            .await
    }

    /// Return a job to the queue, not to be picked up before `run_after`.
    pub async fn reschedule_job(&self, id: &str, error: &str, run_after: DateTime<Utc>) -> Result<()> {
        self.set_job_state(id, JobStatus::Pending, Some(error.to_string()), Some(run_after))
            .await
    }

    async fn set_job_state(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let id = id.to_string();
        let now = db_time(Utc::now());
        let run_after = run_after.map(db_time);
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE jobs SET status = ?1, last_error = COALESCE(?2, last_error),
                                       run_after = COALESCE(?3, run_after), updated_at = ?4
                       WHERE id = ?5"#,
                    params![status.as_str(), error, run_after, now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Put jobs left running by a dead process back in the queue.
    pub async fn requeue_running_jobs(&self) -> Result<usize> {
        let now = db_time(Utc::now());
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE jobs SET status = 'pending', updated_at = ?1 WHERE status = 'running'",
                    params![now],
                )?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    /// When the earliest pending job becomes due, if any is queued.
    pub async fn next_pending_due(&self) -> Result<Option<DateTime<Utc>>> {
        let due = self
            .conn
            .call(|conn| {
                let due = conn.query_row(
                    "SELECT MIN(run_after) FROM jobs WHERE status = 'pending'",
                    [],
                    |row| opt_time_column(row, 0),
                )?;
                Ok(due)
            })
            .await?;
        Ok(due)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let id = id.to_string();
        let job = self
            .conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                        params![id],
                        job_from_row,
                    )
                    .optional()?;
                Ok(job)
            })
            .await?;
        Ok(job)
    }

    pub async fn list_jobs(&self, kind: Option<JobKind>) -> Result<Vec<Job>> {
        let kind = kind.map(|k| k.as_str());
        let jobs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM jobs
                       WHERE ?1 IS NULL OR kind = ?1
                       ORDER BY created_at, rowid"#,
                    JOB_COLUMNS
                ))?;
                let jobs = stmt
                    .query_map(params![kind], job_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }

    // Step log

    /// The stored result of a completed step, as JSON text.
    pub async fn get_step_result(&self, job_id: &str, step: &str) -> Result<Option<String>> {
        let job_id = job_id.to_string();
        let step = step.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT result FROM job_steps WHERE job_id = ?1 AND step_name = ?2",
                        params![job_id, step],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(result)
            })
            .await?;
        Ok(result)
    }

    /// Record a step result. The first recorded result for a step wins.
    pub async fn save_step_result(&self, job_id: &str, step: &str, result: String) -> Result<()> {
        let job_id = job_id.to_string();
        let step = step.to_string();
        let now = db_time(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO job_steps (job_id, step_name, result, completed_at)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(job_id, step_name) DO NOTHING"#,
                    params![job_id, step, result, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn step_names(&self, job_id: &str) -> Result<Vec<String>> {
        let job_id = job_id.to_string();
        let names = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT step_name FROM job_steps WHERE job_id = ?1 ORDER BY completed_at, rowid",
                )?;
                let names = stmt
                    .query_map(params![job_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }
}

const JOB_COLUMNS: &str = "id, kind, owner_id, payload, status, attempts, max_attempts, last_error, \
    dedupe_key, run_after, created_at";

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        kind: parsed_column::<JobKind>(row, 1)?,
        owner_id: row.get::<_, Option<String>>(2)?.map(OwnerId::new),
        payload: json_column(row, 3)?.unwrap_or_default(),
        status: parsed_column::<JobStatus>(row, 4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        last_error: row.get(7)?,
        dedupe_key: row.get(8)?,
        run_after: time_column(row, 9)?,
        created_at: time_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_job(kind: JobKind, dedupe: Option<&str>) -> NewJob {
        NewJob {
            kind,
            owner_id: Some(OwnerId::new("alice")),
            payload: json!({"owner_id": "alice"}),
            max_attempts: 3,
            dedupe_key: dedupe.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_claim_marks_running_and_counts_attempt() {
        let repo = Repository::in_memory().await.unwrap();
        let (id, inserted) = repo.enqueue_job(new_job(JobKind::Import, None)).await.unwrap();
        assert!(inserted);

        let job = repo.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.payload["owner_id"], "alice");

        assert!(repo.claim_next_job(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_passes_over_saturated_owner() {
        let repo = Repository::in_memory().await.unwrap();
        repo.enqueue_job(new_job(JobKind::Import, None)).await.unwrap();
        let (bobs, _) = repo
            .enqueue_job(NewJob {
                owner_id: Some(OwnerId::new("bob")),
                payload: json!({"owner_id": "bob"}),
                ..new_job(JobKind::Import, None)
            })
            .await
            .unwrap();

        let busy = ClaimFilter {
            kinds: vec![],
            owners: vec![(JobKind::Import, OwnerId::new("alice"))],
        };
        let job = repo.claim_next_job_except(Utc::now(), &busy).await.unwrap().unwrap();
        assert_eq!(job.id, bobs);
        assert!(repo.claim_next_job_except(Utc::now(), &busy).await.unwrap().is_none());

        let all_imports = ClaimFilter {
            kinds: vec![JobKind::Import],
            owners: vec![],
        };
        assert!(repo.claim_next_job_except(Utc::now(), &all_imports).await.unwrap().is_none());

        // Alice's job was left pending and is still first in line.
        let job = repo.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.owner_id, Some(OwnerId::new("alice")));
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_dedupe_key_prevents_duplicates() {
        let repo = Repository::in_memory().await.unwrap();
        let (first, _) = repo
            .enqueue_job(new_job(JobKind::WeeklyDigest, Some("weekly:alice:2026-10-05")))
            .await
            .unwrap();
        let (second, inserted) = repo
            .enqueue_job(new_job(JobKind::WeeklyDigest, Some("weekly:alice:2026-10-05")))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(!inserted);
        assert_eq!(repo.list_jobs(Some(JobKind::WeeklyDigest)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rescheduled_job_waits_until_due() {
        let repo = Repository::in_memory().await.unwrap();
        let (id, _) = repo.enqueue_job(new_job(JobKind::Extract, None)).await.unwrap();
        repo.claim_next_job(Utc::now()).await.unwrap().unwrap();

        let later = Utc::now() + chrono::Duration::seconds(60);
        repo.reschedule_job(&id, "timeout", later).await.unwrap();

        assert!(repo.claim_next_job(Utc::now()).await.unwrap().is_none());
        assert!(repo.next_pending_due().await.unwrap().is_some());

        let job = repo
            .claim_next_job(later + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_requeue_running_jobs() {
        let repo = Repository::in_memory().await.unwrap();
        repo.enqueue_job(new_job(JobKind::Import, None)).await.unwrap();
        repo.claim_next_job(Utc::now()).await.unwrap().unwrap();

        assert_eq!(repo.requeue_running_jobs().await.unwrap(), 1);
        assert!(repo.claim_next_job(Utc::now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_step_results_first_write_wins() {
        let repo = Repository::in_memory().await.unwrap();
        let (id, _) = repo.enqueue_job(new_job(JobKind::Summarize, None)).await.unwrap();

        assert!(repo.get_step_result(&id, "extract-facts").await.unwrap().is_none());
        repo.save_step_result(&id, "extract-facts", "1".into()).await.unwrap();
        repo.save_step_result(&id, "extract-facts", "2".into()).await.unwrap();

        assert_eq!(
            repo.get_step_result(&id, "extract-facts").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(repo.step_names(&id).await.unwrap(), vec!["extract-facts"]);
    }
}
