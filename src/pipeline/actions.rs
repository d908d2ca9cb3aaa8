//! Entry points for end-user actions that start pipeline work.

use chrono::NaiveDate;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{OwnerId, SummaryStatus, Tone};

use super::events::{
    ClassifyThemesRequested, ExtractRequested, ImportRequested, PipelineEvent, WeeklyDigestRequested,
};
use super::PipelineContext;

/// Re-enter a summary at the Extract stage so content changes are picked up.
/// Returns the queued job id.
pub async fn retry_summary(ctx: &PipelineContext, owner: &OwnerId, summary_id: &str) -> Result<String> {
    let summary = ctx
        .repo
        .get_summary(owner, summary_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("summary {}", summary_id)))?;

    ctx.repo
        .set_summary_status(owner, summary_id, SummaryStatus::Pending)
        .await?;
    let job_id = ctx
        .queue
        .send(PipelineEvent::ExtractRequested(ExtractRequested {
            owner_id: owner.clone(),
            article_id: summary.article_id,
            summary_id: Some(summary.id.clone()),
            tone: Some(summary.tone),
        }))
        .await?;
    info!(owner = %owner, summary_id, %job_id, "Summary queued for retry");
    Ok(job_id)
}

/// Summarize an article in another tone, creating that variant if needed.
pub async fn regenerate_summary(
    ctx: &PipelineContext,
    owner: &OwnerId,
    article_id: i64,
    tone: Tone,
) -> Result<String> {
    if ctx.repo.get_article(owner, article_id).await?.is_none() {
        return Err(AppError::NotFound(format!("article {}", article_id)));
    }
    ctx.queue
        .send(PipelineEvent::ExtractRequested(ExtractRequested {
            owner_id: owner.clone(),
            article_id,
            summary_id: None,
            tone: Some(tone),
        }))
        .await
}

/// Record a 1-5 rating and/or written feedback; later summaries in the
/// same tone are steered by it.
pub async fn submit_feedback(
    ctx: &PipelineContext,
    owner: &OwnerId,
    summary_id: &str,
    rating: Option<i64>,
    feedback: Option<String>,
) -> Result<()> {
    let feedback = feedback.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
    if rating.is_none() && feedback.is_none() {
        return Err(AppError::Invalid("feedback needs a rating or text".into()));
    }
    ctx.repo.submit_feedback(owner, summary_id, rating, feedback).await
}

pub async fn request_import(ctx: &PipelineContext, owner: &OwnerId, collection_id: Option<i64>) -> Result<String> {
    ctx.queue
        .send(PipelineEvent::ImportRequested(ImportRequested {
            owner_id: owner.clone(),
            collection_id,
        }))
        .await
}

pub async fn request_classify(ctx: &PipelineContext, owner: &OwnerId, force: bool) -> Result<String> {
    ctx.queue
        .send(PipelineEvent::ClassifyThemesRequested(ClassifyThemesRequested {
            owner_id: owner.clone(),
            force,
        }))
        .await
}

/// Manual digest. Without an owner, every owner with summaries in the week
/// gets one.
pub async fn request_digest(
    ctx: &PipelineContext,
    owner: Option<&OwnerId>,
    period_start: Option<NaiveDate>,
) -> Result<String> {
    ctx.queue
        .send(PipelineEvent::WeeklyDigestRequested(WeeklyDigestRequested {
            owner_id: owner.cloned(),
            period_start,
        }))
        .await
}
