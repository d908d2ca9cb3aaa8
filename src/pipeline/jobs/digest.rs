use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::ai::{DigestItem, GeneratedDigest};
use crate::db::{DigestContent, TitledSummary};
use crate::error::{AppError, Result};
use crate::models::{DigestPeriod, JobKind, OwnerId};
use crate::pipeline::events::{PipelineEvent, WeeklyDigestRequested};
use crate::pipeline::worker::{JobContext, JobHandler};
use crate::pipeline::PipelineContext;
use crate::services::notifier::DIGEST_COMPLETED;

use super::weekly_dedupe_key;

/// Most recent completed summaries fed into one digest.
pub const MAX_DIGEST_SUMMARIES: usize = 50;
const TOP_THEMES: usize = 5;

pub struct WeeklyDigestJob {
    ctx: PipelineContext,
}

impl WeeklyDigestJob {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Queue one digest job per owner with completed summaries in the week.
    ///
    /// With an explicit start every owner gets that week. Otherwise each
    /// owner gets the most recent week that has ended in their own offset.
    async fn fan_out(&self, job: &JobContext, event: &WeeklyDigestRequested) -> Result<usize> {
        let now = Utc::now();
        let requested = event.period_start.map(DigestPeriod::week_starting);

        job.steps
            .run("fan-out", || async {
                // Wide enough to cover every owner's local week.
                let (from, to) = match requested {
                    Some(period) => {
                        let (from, to) = period.utc_window(utc());
                        (from - Duration::days(1), to + Duration::days(1))
                    }
                    None => (now - Duration::days(16), now),
                };
                let owners = self.ctx.repo.owners_with_completed_between(from, to).await?;

                let mut queued = 0;
                for owner in &owners {
                    let period = match requested {
                        Some(period) => period,
                        None => {
                            let settings = self.ctx.settings(owner).await?;
                            scheduled_week(now, settings.utc_offset_minutes)
                        }
                    };
                    let (_, inserted) = self
                        .ctx
                        .queue
                        .send_once(
                            PipelineEvent::WeeklyDigestRequested(WeeklyDigestRequested {
                                owner_id: Some(owner.clone()),
                                period_start: Some(period.start),
                            }),
                            weekly_dedupe_key(owner, period.start),
                        )
                        .await?;
                    if inserted {
                        queued += 1;
                    }
                }
                info!(
                    period_start = ?requested.map(|p| p.start),
                    owners = owners.len(),
                    queued,
                    "Queued weekly digests"
                );
                Ok(queued)
            })
            .await
    }

    async fn generate(&self, job: &JobContext, owner: &OwnerId, event: &WeeklyDigestRequested) -> Result<()> {
        let settings = self.ctx.settings(owner).await?;
        let offset = owner_offset(settings.utc_offset_minutes);
        let period = match event.period_start {
            Some(start) => DigestPeriod::week_starting(start),
            None => DigestPeriod::most_recent_completed_week(Utc::now(), offset),
        };

        let Some(api_key) = self.ctx.claude_key(&settings) else {
            info!(owner = %owner, period_start = %period.start, "No Claude API key, skipping digest");
            return Ok(());
        };

        let (from, to) = period.utc_window(offset);
        let summaries = self
            .ctx
            .repo
            .completed_summaries_between(owner, from, to, MAX_DIGEST_SUMMARIES)
            .await?;
        if summaries.is_empty() {
            info!(owner = %owner, period_start = %period.start, "No completed summaries, skipping digest");
            return Ok(());
        }

        match self.ctx.ledger.check_budget(owner, Utc::now()).await {
            Ok(()) => {}
            Err(AppError::BudgetExceeded { spent, cap }) => {
                warn!(owner = %owner, spent = %spent, cap = %cap, "Monthly budget exhausted, skipping digest");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let top_themes = top_themes(&summaries, TOP_THEMES);
        let items: Vec<DigestItem> = summaries
            .iter()
            .map(|s| DigestItem {
                title: s.title.clone(),
                theme: s.summary.theme.clone(),
                summary: s.summary.summary.clone().unwrap_or_default(),
            })
            .collect();
        let label = format!("the week of {} to {}", period.start, period.end);

        let generated: GeneratedDigest = job
            .steps
            .run("generate-digest", || {
                self.ctx
                    .summarizer
                    .generate_digest(owner, &api_key, &label, &top_themes, &items)
            })
            .await?;

        let digest_id: i64 = job
            .steps
            .run("save-digest", || {
                self.ctx.repo.upsert_digest(
                    owner,
                    period,
                    DigestContent {
                        content: generated.content.clone(),
                        summary_count: summaries.len() as i64,
                        top_themes: top_themes.clone(),
                        model: generated.model.clone(),
                    },
                )
            })
            .await?;

        info!(
            owner = %owner,
            digest_id,
            period_start = %period.start,
            summaries = summaries.len(),
            "Weekly digest generated"
        );
        self.ctx
            .notifications
            .notify(
                owner,
                DIGEST_COMPLETED,
                json!({
                    "digest_id": digest_id,
                    "period_start": period.start,
                    "period_end": period.end,
                    "summary_count": summaries.len(),
                    "top_themes": top_themes,
                }),
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for WeeklyDigestJob {
    fn kind(&self) -> JobKind {
        JobKind::WeeklyDigest
    }

    async fn execute(&self, job: &JobContext) -> Result<()> {
        let event: WeeklyDigestRequested = job.payload()?;
        match &event.owner_id {
            Some(owner) => self.generate(job, owner, &event).await,
            None => self.fan_out(job, &event).await.map(|_| ()),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// The owner's fixed offset; out-of-range values fall back to UTC.
fn owner_offset(minutes: i32) -> FixedOffset {
    match minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
        Some(offset) => offset,
        None => {
            warn!(utc_offset_minutes = minutes, "Invalid UTC offset, using UTC");
            utc()
        }
    }
}

/// The most recent week that has fully ended for an owner at `now`.
fn scheduled_week(now: DateTime<Utc>, utc_offset_minutes: i32) -> DigestPeriod {
    DigestPeriod::most_recent_completed_week(now, owner_offset(utc_offset_minutes))
}

/// Most frequent themes, ties broken by name; unlabeled summaries are not counted.
fn top_themes(summaries: &[TitledSummary], limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for theme in summaries.iter().filter_map(|s| s.summary.theme.as_deref()) {
        *counts.entry(theme).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(theme, _)| theme.to_string())
        .collect()
}
