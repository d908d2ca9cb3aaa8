use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{JobKind, NewArticle};
use crate::pipeline::events::{ExtractRequested, ImportRequested, PipelineEvent};
use crate::pipeline::worker::{JobContext, JobHandler};
use crate::pipeline::PipelineContext;
use crate::services::notifier::IMPORT_COMPLETED;

/// Most recent unsummarized articles queued for extraction per import.
const MAX_EXTRACTS_PER_IMPORT: usize = 50;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct UpsertCounts {
    new: usize,
    updated: usize,
}

pub struct ImportJob {
    ctx: PipelineContext,
}

impl ImportJob {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for ImportJob {
    fn kind(&self) -> JobKind {
        JobKind::Import
    }

    async fn execute(&self, job: &JobContext) -> Result<()> {
        let event: ImportRequested = job.payload()?;
        let owner = &event.owner_id;
        let settings = self.ctx.settings(owner).await?;
        let token = self
            .ctx
            .raindrop_token(&settings)
            .ok_or_else(|| AppError::MissingCredential("Raindrop token is not configured".into()))?;

        let bookmarks: Vec<NewArticle> = job
            .steps
            .run("fetch-bookmarks", || {
                self.ctx.bookmarks.fetch_bookmarks(&token, event.collection_id)
            })
            .await?;

        let counts: UpsertCounts = job
            .steps
            .run("upsert-articles", || async {
                let mut counts = UpsertCounts::default();
                for bookmark in bookmarks.iter().cloned() {
                    let (_, inserted) = self.ctx.repo.upsert_article(owner, bookmark).await?;
                    if inserted {
                        counts.new += 1;
                    } else {
                        counts.updated += 1;
                    }
                }
                Ok(counts)
            })
            .await?;

        let queued: usize = job
            .steps
            .run("queue-extracts", || async {
                let pending = self
                    .ctx
                    .repo
                    .articles_without_summary(owner, MAX_EXTRACTS_PER_IMPORT)
                    .await?;
                for article in &pending {
                    self.ctx
                        .queue
                        .send(PipelineEvent::ExtractRequested(ExtractRequested {
                            owner_id: owner.clone(),
                            article_id: article.id,
                            summary_id: None,
                            tone: None,
                        }))
                        .await?;
                }
                Ok(pending.len())
            })
            .await?;

        info!(
            owner = %owner,
            fetched = bookmarks.len(),
            new = counts.new,
            updated = counts.updated,
            queued,
            "Import completed"
        );
        self.ctx
            .notifications
            .notify(
                owner,
                IMPORT_COMPLETED,
                json!({ "new": counts.new, "updated": counts.updated, "queued": queued }),
            )
            .await;
        Ok(())
    }
}
