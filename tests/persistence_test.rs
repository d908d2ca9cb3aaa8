use chrono::Utc;
use tempfile::TempDir;

use speedy_digest::db::Repository;
use speedy_digest::ledger::{Ledger, TokenUsage, Usd};
use speedy_digest::models::{JobKind, JobStatus, NewJob, OwnerId, Provider};

fn db_path(dir: &TempDir) -> String {
    dir.path().join("digest.db").to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_interrupted_job_resumes_with_its_steps() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let job_id = {
        let repo = Repository::new(&path).await.unwrap();
        let (job_id, _) = repo
            .enqueue_job(NewJob {
                kind: JobKind::Summarize,
                owner_id: Some(OwnerId::new("alice")),
                payload: serde_json::json!({"owner_id": "alice", "article_id": 1, "tone": "neutral"}),
                max_attempts: 5,
                dedupe_key: None,
            })
            .await
            .unwrap();
        let claimed = repo.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        repo.save_step_result(&job_id, "extract-facts", "{\"main_claim\":\"x\"}".into())
            .await
            .unwrap();
        job_id
    };

    // A new process opens the same database.
    let repo = Repository::new(&path).await.unwrap();
    assert_eq!(repo.get_job(&job_id).await.unwrap().unwrap().status, JobStatus::Running);
    assert_eq!(repo.requeue_running_jobs().await.unwrap(), 1);

    let job = repo.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(repo.step_names(&job_id).await.unwrap(), vec!["extract-facts".to_string()]);
}

#[test]
fn test_usage_totals_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let owner = OwnerId::new("alice");

    tokio_test::block_on(async {
        let repo = Repository::new(&path).await.unwrap();
        let ledger = Ledger::new(repo, None);
        for _ in 0..3 {
            ledger
                .record_usage(
                    &owner,
                    Provider::OpenAi,
                    "text-embedding-3-small",
                    TokenUsage {
                        input_tokens: 50,
                        output_tokens: 0,
                    },
                    None,
                )
                .await
                .unwrap();
        }
    });

    tokio_test::block_on(async {
        let ledger = Ledger::new(Repository::new(&path).await.unwrap(), None);
        // 50 tokens at $0.02 per million is exactly one micro-dollar.
        assert_eq!(
            ledger.monthly_cost(&owner, Utc::now()).await.unwrap(),
            Usd::from_micros(3)
        );
    });
}
