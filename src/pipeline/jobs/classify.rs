use async_trait::async_trait;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::{debug, info};

use crate::clustering::{
    assign_incremental, cluster_all, ClassificationMode, ClassificationPlan, ThemeCentroid,
};
use crate::error::{AppError, Result};
use crate::models::{JobKind, OwnerId};
use crate::pipeline::events::ClassifyThemesRequested;
use crate::pipeline::worker::{JobContext, JobHandler};
use crate::pipeline::PipelineContext;
use crate::services::notifier::{THEMES_COMPLETED, THEMES_FAILED};

pub struct ClassifyThemesJob {
    ctx: PipelineContext,
}

impl ClassifyThemesJob {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    async fn plan(&self, owner: &OwnerId) -> Result<ClassificationPlan> {
        let config = &self.ctx.clustering;
        let existing = self.ctx.repo.existing_themes(owner).await?;

        if existing.is_empty() {
            let documents = self.ctx.repo.theme_documents(owner, false).await?;
            debug!(owner = %owner, documents = documents.len(), "No themes yet, clustering everything");
            let mut rng = StdRng::from_entropy();
            return Ok(cluster_all(&documents, config, self.ctx.labeler.as_ref(), &mut rng));
        }

        let mut centroids = Vec::with_capacity(existing.len());
        for theme in &existing {
            let samples = self
                .ctx
                .repo
                .theme_sample_embeddings(owner, theme, config.centroid_sample_size)
                .await?;
            if let Some(centroid) = ThemeCentroid::from_samples(theme.as_str(), &samples) {
                centroids.push(centroid);
            }
        }

        let documents = self.ctx.repo.theme_documents(owner, true).await?;
        debug!(
            owner = %owner,
            documents = documents.len(),
            themes = existing.len(),
            centroids = centroids.len(),
            "Assigning new summaries to existing themes"
        );
        let mut rng = StdRng::from_entropy();
        Ok(assign_incremental(
            &documents,
            &centroids,
            &existing,
            config,
            self.ctx.labeler.as_ref(),
            &mut rng,
        ))
    }

    /// Write labels in fixed-size chunks: chunks in order, writes within a chunk concurrently.
    async fn write(&self, owner: &OwnerId, plan: &ClassificationPlan) -> Result<usize> {
        let mut written = 0;
        for chunk in plan.assignments.chunks(self.ctx.clustering.write_batch_size.max(1)) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|a| self.ctx.repo.set_theme(owner, &a.summary_id, &a.theme)),
            )
            .await;
            for result in results {
                if result? {
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl JobHandler for ClassifyThemesJob {
    fn kind(&self) -> JobKind {
        JobKind::ClassifyThemes
    }

    async fn execute(&self, job: &JobContext) -> Result<()> {
        let event: ClassifyThemesRequested = job.payload()?;
        let owner = &event.owner_id;

        if event.force {
            let cleared: usize = job
                .steps
                .run("reset-themes", || self.ctx.repo.reset_themes(owner))
                .await?;
            info!(owner = %owner, cleared, "Cleared theme labels for full reclassification");
        }

        let plan: ClassificationPlan = job.steps.run("plan-themes", || self.plan(owner)).await?;
        let written: usize = job
            .steps
            .run("write-themes", || self.write(owner, &plan))
            .await?;

        let mode = match plan.mode {
            ClassificationMode::Full => "full",
            ClassificationMode::Incremental => "incremental",
        };
        info!(
            owner = %owner,
            mode,
            labeled = written,
            new_themes = plan.new_themes.len(),
            "Theme classification completed"
        );
        self.ctx
            .notifications
            .notify(
                owner,
                THEMES_COMPLETED,
                json!({
                    "mode": plan.mode,
                    "labeled": written,
                    "new_themes": plan.new_themes,
                }),
            )
            .await;
        Ok(())
    }

    async fn on_failure(&self, job: &JobContext, error: &AppError) {
        let Ok(event) = job.payload::<ClassifyThemesRequested>() else {
            return;
        };
        self.ctx
            .notifications
            .notify(&event.owner_id, THEMES_FAILED, json!({ "error": error.to_string() }))
            .await;
    }
}
