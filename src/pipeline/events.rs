use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{JobKind, OwnerId, Tone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequested {
    pub owner_id: OwnerId,
    /// Restrict the import to one remote collection.
    #[serde(default)]
    pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRequested {
    pub owner_id: OwnerId,
    pub article_id: i64,
    #[serde(default)]
    pub summary_id: Option<String>,
    #[serde(default)]
    pub tone: Option<Tone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeRequested {
    pub owner_id: OwnerId,
    pub article_id: i64,
    pub tone: Tone,
    #[serde(default)]
    pub summary_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyThemesRequested {
    pub owner_id: OwnerId,
    /// Clear every label first and cluster from scratch.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDigestRequested {
    /// `None` fans out to every owner with summaries in the period.
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    /// Defaults to the most recently completed week.
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
}

/// A request for background work. Each maps onto one job kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ImportRequested(ImportRequested),
    ExtractRequested(ExtractRequested),
    SummarizeRequested(SummarizeRequested),
    ClassifyThemesRequested(ClassifyThemesRequested),
    WeeklyDigestRequested(WeeklyDigestRequested),
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::ImportRequested(_) => "import.requested",
            PipelineEvent::ExtractRequested(_) => "item.extract.requested",
            PipelineEvent::SummarizeRequested(_) => "item.summarize.requested",
            PipelineEvent::ClassifyThemesRequested(_) => "classify-themes.requested",
            PipelineEvent::WeeklyDigestRequested(_) => "generate-weekly.requested",
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            PipelineEvent::ImportRequested(_) => JobKind::Import,
            PipelineEvent::ExtractRequested(_) => JobKind::Extract,
            PipelineEvent::SummarizeRequested(_) => JobKind::Summarize,
            PipelineEvent::ClassifyThemesRequested(_) => JobKind::ClassifyThemes,
            PipelineEvent::WeeklyDigestRequested(_) => JobKind::WeeklyDigest,
        }
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        match self {
            PipelineEvent::ImportRequested(e) => Some(&e.owner_id),
            PipelineEvent::ExtractRequested(e) => Some(&e.owner_id),
            PipelineEvent::SummarizeRequested(e) => Some(&e.owner_id),
            PipelineEvent::ClassifyThemesRequested(e) => Some(&e.owner_id),
            PipelineEvent::WeeklyDigestRequested(e) => e.owner_id.as_ref(),
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            PipelineEvent::ImportRequested(e) => serde_json::to_value(e)?,
            PipelineEvent::ExtractRequested(e) => serde_json::to_value(e)?,
            PipelineEvent::SummarizeRequested(e) => serde_json::to_value(e)?,
            PipelineEvent::ClassifyThemesRequested(e) => serde_json::to_value(e)?,
            PipelineEvent::WeeklyDigestRequested(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }
}
