use serde::Serialize;

use crate::ai::cosine_similarity;
use crate::error::Result;
use crate::models::{OwnerId, Tone};
use crate::pipeline::PipelineContext;

/// Hits less similar than this are dropped.
pub const MIN_SIMILARITY: f32 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub summary_id: String,
    pub article_id: i64,
    pub title: String,
    pub tone: Tone,
    pub summary: String,
    pub theme: Option<String>,
    pub similarity: f32,
}

/// Rank the owner's embedded summaries against `query`, best first.
///
/// Without an embedding key there is nothing to compare against, so the
/// result is empty.
pub async fn search(ctx: &PipelineContext, owner: &OwnerId, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let settings = ctx.settings(owner).await?;
    let key = ctx.openai_key(&settings);
    let vector = ctx.embedder.embed(owner, query, key.as_deref(), None).await?;
    if vector.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = ctx.repo.embedded_summaries(owner).await?;
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter_map(|c| {
            let similarity = cosine_similarity(&vector, c.summary.embedding.as_deref()?);
            (similarity >= MIN_SIMILARITY).then(|| SearchHit {
                summary_id: c.summary.id,
                article_id: c.summary.article_id,
                title: c.title,
                tone: c.summary.tone,
                summary: c.summary.summary.unwrap_or_default(),
                theme: c.summary.theme,
                similarity,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(limit);
    tracing::debug!(owner = %owner, hits = hits.len(), "Semantic search");
    Ok(hits)
}
