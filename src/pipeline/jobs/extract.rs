use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{JobKind, Tone};
use crate::pipeline::events::{ExtractRequested, PipelineEvent, SummarizeRequested};
use crate::pipeline::worker::{JobContext, JobHandler};
use crate::pipeline::PipelineContext;
use crate::services::notifier::SUMMARY_FAILED;
use crate::services::ExtractedContent;

use super::load_article;

pub struct ExtractJob {
    ctx: PipelineContext,
}

impl ExtractJob {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for ExtractJob {
    fn kind(&self) -> JobKind {
        JobKind::Extract
    }

    async fn execute(&self, job: &JobContext) -> Result<()> {
        let event: ExtractRequested = job.payload()?;
        let owner = &event.owner_id;
        let article = load_article(&self.ctx, owner, event.article_id).await?;

        let content: ExtractedContent = job
            .steps
            .run("extract-content", || self.ctx.extractor.extract(&article.url))
            .await?;

        job.steps
            .run("save-content", || async {
                if !self
                    .ctx
                    .repo
                    .update_article_text(owner, article.id, content.text.clone())
                    .await?
                {
                    return Err(AppError::NotFound(format!("article {}", article.id)));
                }
                Ok(())
            })
            .await?;

        let tone: Tone = job
            .steps
            .run("queue-summarize", || async {
                let tone = match event.tone {
                    Some(tone) => tone,
                    None => self.ctx.settings(owner).await?.default_tone,
                };
                self.ctx
                    .queue
                    .send(PipelineEvent::SummarizeRequested(SummarizeRequested {
                        owner_id: owner.clone(),
                        article_id: article.id,
                        tone,
                        summary_id: event.summary_id.clone(),
                    }))
                    .await?;
                Ok(tone)
            })
            .await?;

        info!(
            owner = %owner,
            article_id = article.id,
            length = content.length.unwrap_or_else(|| content.text.chars().count()),
            %tone,
            "Article text extracted"
        );
        Ok(())
    }

    async fn on_failure(&self, job: &JobContext, error: &AppError) {
        let Ok(event) = job.payload::<ExtractRequested>() else {
            return;
        };
        let Some(summary_id) = event.summary_id.as_deref() else {
            return;
        };
        let owner = &event.owner_id;
        let message = error.to_string();

        if let Err(e) = self.ctx.repo.mark_summary_failed(owner, summary_id, &message).await {
            warn!(owner = %owner, summary_id, error = %e, "Failed to record summary failure");
        }
        self.ctx
            .notifications
            .notify(
                owner,
                SUMMARY_FAILED,
                json!({ "summary_id": summary_id, "article_id": event.article_id, "error": message }),
            )
            .await;
    }
}
