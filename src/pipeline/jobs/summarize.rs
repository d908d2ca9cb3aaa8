use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::ai::GeneratedSummary;
use crate::db::SummaryCompletion;
use crate::error::{AppError, Result};
use crate::models::{Facts, JobKind, SummaryStatus};
use crate::pipeline::events::SummarizeRequested;
use crate::pipeline::worker::{JobContext, JobHandler};
use crate::pipeline::PipelineContext;
use crate::services::notifier::{SUMMARY_COMPLETED, SUMMARY_FAILED};

use super::load_article;

/// Shortest extracted text worth summarizing, in characters.
pub const MIN_TEXT_CHARS: usize = 100;

/// Feedback entries injected into the summary prompt.
const FEEDBACK_LIMIT: usize = 3;

const UPSERT_STEP: &str = "upsert-summary";

pub struct SummarizeJob {
    ctx: PipelineContext,
}

impl SummarizeJob {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// The summary this job has taken over: the one it was asked to retry,
    /// or the row it moved to processing. A job that failed before touching
    /// any row leaves existing summaries alone.
    async fn claimed_summary_id(&self, job: &JobContext, event: &SummarizeRequested) -> Option<String> {
        if let Some(id) = &event.summary_id {
            return Some(id.clone());
        }
        match job.steps.cached::<String>(UPSERT_STEP).await {
            Ok(id) => id,
            Err(e) => {
                warn!(owner = %event.owner_id, job_id = %job.job.id, error = %e, "Failed to read summary step");
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler for SummarizeJob {
    fn kind(&self) -> JobKind {
        JobKind::Summarize
    }

    async fn execute(&self, job: &JobContext) -> Result<()> {
        let event: SummarizeRequested = job.payload()?;
        let owner = &event.owner_id;
        let settings = self.ctx.settings(owner).await?;
        let api_key = self.ctx.require_claude_key(&settings)?;

        let article = load_article(&self.ctx, owner, event.article_id).await?;
        let length = article.text_len();
        if length < MIN_TEXT_CHARS {
            return Err(AppError::ContentTooShort {
                length,
                minimum: MIN_TEXT_CHARS,
            });
        }
        let text = article.excerpt.clone().unwrap_or_default();

        let summary_id: String = job
            .steps
            .run(UPSERT_STEP, || async {
                match &event.summary_id {
                    Some(id) => {
                        self.ctx
                            .repo
                            .set_summary_status(owner, id, SummaryStatus::Processing)
                            .await?;
                        Ok(id.clone())
                    }
                    None => {
                        self.ctx
                            .repo
                            .upsert_summary_status(owner, article.id, event.tone, SummaryStatus::Processing)
                            .await
                    }
                }
            })
            .await?;

        // Checked on every attempt, before any paid call.
        self.ctx.ledger.check_budget(owner, Utc::now()).await?;

        let facts: Facts = job
            .steps
            .run("extract-facts", || {
                self.ctx
                    .summarizer
                    .extract_facts(owner, &api_key, Some(summary_id.as_str()), &article.title, &text)
            })
            .await?;

        let generated: GeneratedSummary = job
            .steps
            .run("generate-summary", || async {
                let feedback = self
                    .ctx
                    .repo
                    .recent_feedback(owner, event.tone, FEEDBACK_LIMIT)
                    .await?;
                self.ctx
                    .summarizer
                    .generate_summary(
                        owner,
                        &api_key,
                        Some(summary_id.as_str()),
                        &article.title,
                        &facts,
                        event.tone,
                        &feedback,
                    )
                    .await
            })
            .await?;

        let embedding: Vec<f32> = job
            .steps
            .run("embed", || async {
                let input = format!("{}\n{}", article.title, generated.output.summary);
                let key = self.ctx.openai_key(&settings);
                match self
                    .ctx
                    .embedder
                    .embed(owner, &input, key.as_deref(), Some(summary_id.as_str()))
                    .await
                {
                    Ok(vector) => Ok(vector),
                    Err(e) => {
                        warn!(owner = %owner, summary_id = %summary_id, error = %e, "Embedding failed, continuing without one");
                        Ok(Vec::new())
                    }
                }
            })
            .await?;

        job.steps
            .run("save-summary", || async {
                self.ctx
                    .repo
                    .complete_summary(
                        owner,
                        &summary_id,
                        SummaryCompletion {
                            summary: generated.output.summary.clone(),
                            rating: generated.output.rating,
                            rating_reason: generated.output.rating_reason.clone(),
                            facts: facts.clone(),
                            model: generated.model.clone(),
                            embedding: embedding.clone(),
                        },
                    )
                    .await
            })
            .await?;

        info!(
            owner = %owner,
            summary_id = %summary_id,
            article_id = article.id,
            tone = %event.tone,
            rating = generated.output.rating,
            embedded = !embedding.is_empty(),
            "Summary completed"
        );
        self.ctx
            .notifications
            .notify(
                owner,
                SUMMARY_COMPLETED,
                json!({
                    "summary_id": summary_id,
                    "article_id": article.id,
                    "tone": event.tone,
                    "rating": generated.output.rating,
                }),
            )
            .await;
        Ok(())
    }

    async fn on_failure(&self, job: &JobContext, error: &AppError) {
        let Ok(event) = job.payload::<SummarizeRequested>() else {
            return;
        };
        let owner = &event.owner_id;
        let message = error.to_string();
        let summary_id = self.claimed_summary_id(job, &event).await;

        if let Some(id) = summary_id.as_deref() {
            if let Err(e) = self.ctx.repo.mark_summary_failed(owner, id, &message).await {
                warn!(owner = %owner, summary_id = id, error = %e, "Failed to record summary failure");
            }
        }
        self.ctx
            .notifications
            .notify(
                owner,
                SUMMARY_FAILED,
                json!({
                    "summary_id": summary_id,
                    "article_id": event.article_id,
                    "tone": event.tone,
                    "error": message,
                }),
            )
            .await;
    }
}
