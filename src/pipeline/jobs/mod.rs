mod classify;
mod digest;
mod extract;
mod import;
mod summarize;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{Article, OwnerId};

use super::worker::JobHandler;
use super::PipelineContext;

pub use classify::ClassifyThemesJob;
pub use digest::WeeklyDigestJob;
pub use extract::ExtractJob;
pub use import::ImportJob;
pub use summarize::SummarizeJob;

/// One handler per job kind, sharing `ctx`.
pub fn handlers(ctx: &PipelineContext) -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(ImportJob::new(ctx.clone())),
        Arc::new(ExtractJob::new(ctx.clone())),
        Arc::new(SummarizeJob::new(ctx.clone())),
        Arc::new(ClassifyThemesJob::new(ctx.clone())),
        Arc::new(WeeklyDigestJob::new(ctx.clone())),
    ]
}

/// Dedupe key of the scheduled all-owner digest batch, one per UTC hour.
/// Owners' weeks close at different hours, so the batch runs hourly and the
/// per-owner key keeps each week to a single digest.
pub fn weekly_batch_dedupe_key(at: DateTime<Utc>) -> String {
    format!("weekly-digest:batch:{}", at.format("%Y-%m-%dT%H"))
}

/// Dedupe key of the per-owner digest job for the week starting `start`.
pub fn weekly_dedupe_key(owner: &OwnerId, start: NaiveDate) -> String {
    format!("weekly-digest:{}:{}", owner, start)
}

/// Live article or `NotFound`; soft-deleted articles count as missing.
async fn load_article(ctx: &PipelineContext, owner: &OwnerId, article_id: i64) -> Result<Article> {
    ctx.repo
        .get_article(owner, article_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("article {}", article_id)))
}
