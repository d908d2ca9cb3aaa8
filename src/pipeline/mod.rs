//! Event-driven background pipeline: import, extract, summarize, classify, digest.

mod actions;
pub mod events;
mod jobs;
mod limits;
mod queue;
mod steps;
mod worker;

use std::sync::Arc;

use crate::ai::{ChatModel, ClaudeClient, Embedder, EmbeddingProvider, OpenAiEmbeddings, Summarizer};
use crate::clustering::{KeywordLabeler, ThemeLabeler};
use crate::config::{ClusteringConfig, Config};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::ledger::Ledger;
use crate::models::{OwnerId, UserSettings};
use crate::services::{
    BookmarkSource, ContentExtractor, ContentFetcher, Notifications, Notifier, RaindropClient,
};

pub use actions::{
    regenerate_summary, request_classify, request_digest, request_import, retry_summary, submit_feedback,
};
pub use events::PipelineEvent;
pub use jobs::{
    handlers, weekly_batch_dedupe_key, weekly_dedupe_key, ClassifyThemesJob, ExtractJob, ImportJob,
    SummarizeJob, WeeklyDigestJob,
};
pub use limits::{ConcurrencyLimiter, JobPermit};
pub use queue::JobQueue;
pub use steps::StepContext;
pub use worker::{JobContext, JobHandler, Worker};

/// External systems the pipeline talks to.
pub struct Collaborators {
    pub chat: Arc<dyn ChatModel>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub bookmarks: Arc<dyn BookmarkSource>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Production clients for every collaborator.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self {
            chat: Arc::new(ClaudeClient::new()?),
            embeddings: Arc::new(OpenAiEmbeddings::new(config.models.embedding_model.clone())?),
            bookmarks: Arc::new(RaindropClient::new()?),
            extractor: Arc::new(ContentFetcher::new(config.extraction_service_url.clone())?),
            notifier,
        })
    }
}

/// System-wide credentials used when an owner has none of their own.
#[derive(Debug, Clone, Default)]
pub struct FallbackCredentials {
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub raindrop_token: Option<String>,
}

/// Everything a job handler needs, shared across handlers.
#[derive(Clone)]
pub struct PipelineContext {
    pub repo: Repository,
    pub ledger: Ledger,
    pub summarizer: Summarizer,
    pub embedder: Embedder,
    pub bookmarks: Arc<dyn BookmarkSource>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub notifications: Notifications,
    pub queue: JobQueue,
    pub credentials: FallbackCredentials,
    pub clustering: ClusteringConfig,
    pub labeler: Arc<dyn ThemeLabeler>,
}

impl PipelineContext {
    pub fn new(repo: Repository, config: &Config, collaborators: Collaborators) -> Result<Self> {
        let ledger = Ledger::new(repo.clone(), config.default_monthly_budget()?);
        Ok(Self {
            summarizer: Summarizer::new(collaborators.chat, ledger.clone(), config.models.clone()),
            embedder: Embedder::new(collaborators.embeddings, ledger.clone()),
            bookmarks: collaborators.bookmarks,
            extractor: collaborators.extractor,
            notifications: Notifications::new(repo.clone(), collaborators.notifier),
            queue: JobQueue::new(repo.clone(), config.limits.clone()),
            credentials: FallbackCredentials {
                claude_api_key: config.claude_api_key.clone(),
                openai_api_key: config.openai_api_key.clone(),
                raindrop_token: config.raindrop_token.clone(),
            },
            clustering: config.clustering.clone(),
            labeler: Arc::new(KeywordLabeler),
            ledger,
            repo,
        })
    }

    /// Worker wired with every job handler.
    pub fn worker(&self, config: &Config) -> Worker {
        Worker::new(
            self.repo.clone(),
            config.worker.clone(),
            config.limits.clone(),
            handlers(self),
        )
    }

    pub(crate) async fn settings(&self, owner: &OwnerId) -> Result<UserSettings> {
        self.repo.get_user_settings(owner).await
    }

    /// The owner's generative key, else the system one.
    pub(crate) fn claude_key(&self, settings: &UserSettings) -> Option<String> {
        pick_key(&settings.claude_api_key, &self.credentials.claude_api_key)
    }

    /// The owner's embedding key, else the system one.
    pub(crate) fn openai_key(&self, settings: &UserSettings) -> Option<String> {
        pick_key(&settings.openai_api_key, &self.credentials.openai_api_key)
    }

    pub(crate) fn raindrop_token(&self, settings: &UserSettings) -> Option<String> {
        pick_key(&settings.raindrop_token, &self.credentials.raindrop_token)
    }

    pub(crate) fn require_claude_key(&self, settings: &UserSettings) -> Result<String> {
        self.claude_key(settings)
            .ok_or_else(|| AppError::MissingCredential("Claude API key is not configured".into()))
    }
}

fn pick_key(own: &Option<String>, fallback: &Option<String>) -> Option<String> {
    own.as_deref()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| fallback.as_deref().filter(|k| !k.trim().is_empty()))
        .map(String::from)
}
