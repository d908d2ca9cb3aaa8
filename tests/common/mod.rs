//! Mock collaborators and a wired pipeline for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use speedy_digest::ai::prompts::{DIGEST_SYSTEM, FACTS_SYSTEM, SUMMARY_SYSTEM};
use speedy_digest::ai::{ChatCompletion, ChatModel, ChatRequest, Embedding, EmbeddingProvider};
use speedy_digest::db::{Repository, SummaryCompletion};
use speedy_digest::error::{AppError, Result};
use speedy_digest::ledger::TokenUsage;
use speedy_digest::models::{Facts, NewArticle, OwnerId, Provider, SummaryStatus, Tone, UserSettings};
use speedy_digest::pipeline::{Collaborators, PipelineContext, Worker};
use speedy_digest::services::{BookmarkSource, BroadcastNotifier, ContentExtractor, ExtractedContent};
use speedy_digest::Config;

pub const ARTICLE_TEXT: &str = "Rust async runtimes schedule futures cooperatively. \
    Every await point is a place where a task can yield to the executor, which lets one \
    thread drive thousands of concurrent network requests without blocking.";

/// Chat model answering by stage, with optional scripted transient failures.
#[derive(Default)]
pub struct MockChat {
    pub calls: AtomicUsize,
    pub facts_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub digest_calls: AtomicUsize,
    /// Summary-stage calls that fail before one succeeds.
    pub fail_summary_times: AtomicUsize,
}

#[async_trait]
impl ChatModel for MockChat {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, _api_key: &str, request: ChatRequest) -> Result<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request.system.as_deref().unwrap_or_default();

        let text = if system == FACTS_SYSTEM {
            self.facts_calls.fetch_add(1, Ordering::SeqCst);
            "```json\n{\"key_points\": [\"Futures yield at await points\"], \
             \"main_claim\": \"Async Rust scales with few threads\", \
             \"caveats\": [], \"keywords\": [\"rust\", \"async\"]}\n```"
                .to_string()
        } else if system == SUMMARY_SYSTEM {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_summary_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_summary_times.store(remaining - 1, Ordering::SeqCst);
                return Err(AppError::GenerativeApi("529 overloaded".into()));
            }
            "{\"summary\": \"Async Rust lets one thread juggle many requests.\", \
             \"rating\": 4, \"rating_reason\": \"Clear and practical\"}"
                .to_string()
        } else if system == DIGEST_SYSTEM {
            self.digest_calls.fetch_add(1, Ordering::SeqCst);
            "## Trend\n- Async everywhere\n## Topics\n1. Rust\n## Takeaways\n- Yield often\n\
             ## Recommendation\nRead the tokio tutorial."
                .to_string()
        } else {
            return Err(AppError::InvalidResponse(format!("unexpected system prompt: {}", system)));
        };

        Ok(ChatCompletion {
            text,
            model: request.model,
            usage: TokenUsage {
                input_tokens: 1_000,
                output_tokens: 200,
            },
        })
    }
}

/// Deterministic embeddings; text containing "fail-embed" errors.
#[derive(Default)]
pub struct MockEmbeddings {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn embed(&self, _api_key: &str, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("fail-embed") {
            return Err(AppError::EmbeddingApi("service unavailable".into()));
        }
        let len = text.chars().count() as f32;
        Ok(Embedding {
            vector: vec![1.0, len % 7.0 + 1.0, 0.5, (len % 3.0) + 0.25],
            model: "text-embedding-3-small".into(),
            tokens: (text.len() / 4) as u64,
        })
    }
}

#[derive(Default)]
pub struct MockBookmarks {
    pub bookmarks: Mutex<Vec<NewArticle>>,
    pub calls: AtomicUsize,
}

impl MockBookmarks {
    pub fn with(bookmarks: Vec<NewArticle>) -> Self {
        Self {
            bookmarks: Mutex::new(bookmarks),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BookmarkSource for MockBookmarks {
    async fn fetch_bookmarks(&self, _token: &str, collection: Option<i64>) -> Result<Vec<NewArticle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bookmarks = self.bookmarks.lock().map_err(|_| AppError::RaindropApi("poisoned".into()))?;
        Ok(bookmarks
            .iter()
            .filter(|b| collection.is_none() || b.collection_id == collection)
            .cloned()
            .collect())
    }
}

/// Extraction service returning `ARTICLE_TEXT`, with per-URL scripted failures.
#[derive(Default)]
pub struct MockExtractor {
    pub calls: AtomicUsize,
    /// url -> (status, remaining failures)
    pub failures: Mutex<HashMap<String, (u16, usize)>>,
}

impl MockExtractor {
    pub fn fail(&self, url: &str, status: u16, times: usize) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(url.to_string(), (status, times));
        }
    }
}

#[async_trait]
impl ContentExtractor for MockExtractor {
    async fn extract(&self, article_url: &str) -> Result<ExtractedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self
                .failures
                .lock()
                .map_err(|_| AppError::Extraction { status: 500, message: "poisoned".into() })?;
            if let Some((status, remaining)) = failures.get_mut(article_url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::Extraction {
                        status: *status,
                        message: format!("scripted failure for {}", article_url),
                    });
                }
            }
        }
        Ok(ExtractedContent {
            title: None,
            text: ARTICLE_TEXT.to_string(),
            length: Some(ARTICLE_TEXT.chars().count()),
            language: Some("en".into()),
        })
    }
}

pub struct TestPipeline {
    pub repo: Repository,
    pub ctx: PipelineContext,
    pub worker: Worker,
    pub chat: Arc<MockChat>,
    pub embeddings: Arc<MockEmbeddings>,
    pub bookmarks: Arc<MockBookmarks>,
    pub extractor: Arc<MockExtractor>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl TestPipeline {
    pub async fn new(bookmarks: Vec<NewArticle>) -> Self {
        let mut config = Config::default();
        config.default_monthly_budget_usd = "0".into();
        config.worker.retry_backoff_ms = 1;
        config.worker.poll_interval_ms = 5;

        let repo = Repository::in_memory().await.unwrap();
        let chat = Arc::new(MockChat::default());
        let embeddings = Arc::new(MockEmbeddings::default());
        let bookmarks = Arc::new(MockBookmarks::with(bookmarks));
        let extractor = Arc::new(MockExtractor::default());
        let notifier = Arc::new(BroadcastNotifier::new(64));

        let ctx = PipelineContext::new(
            repo.clone(),
            &config,
            Collaborators {
                chat: chat.clone(),
                embeddings: embeddings.clone(),
                bookmarks: bookmarks.clone(),
                extractor: extractor.clone(),
                notifier: notifier.clone(),
            },
        )
        .unwrap();
        let worker = ctx.worker(&config);

        Self {
            repo,
            ctx,
            worker,
            chat,
            embeddings,
            bookmarks,
            extractor,
            notifier,
        }
    }

    pub async fn run(&self) -> usize {
        self.worker.run_until_idle().await.unwrap()
    }

    pub async fn notification_events(&self, owner: &OwnerId) -> Vec<String> {
        self.repo
            .unread_notifications(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.event)
            .collect()
    }
}

/// Owner with every credential configured.
pub async fn owner_with_keys(repo: &Repository, name: &str) -> OwnerId {
    let owner = OwnerId::new(name);
    repo.upsert_user(
        &owner,
        UserSettings {
            claude_api_key: Some("sk-ant-test".into()),
            openai_api_key: Some("sk-openai-test".into()),
            raindrop_token: Some("raindrop-test".into()),
            ..UserSettings::default()
        },
    )
    .await
    .unwrap();
    owner
}

pub fn bookmark(remote_id: i64, title: &str) -> NewArticle {
    NewArticle {
        remote_id,
        title: title.to_string(),
        url: format!("https://example.com/articles/{}", remote_id),
        excerpt: None,
        cover_url: None,
        tags: vec![],
        collection_id: None,
        remote_created_at: None,
    }
}

/// Store an article with extracted text and a completed, embedded summary.
pub async fn completed_summary(
    repo: &Repository,
    owner: &OwnerId,
    remote_id: i64,
    title: &str,
    text: &str,
    embedding: Vec<f32>,
) -> String {
    let (article_id, _) = repo.upsert_article(owner, bookmark(remote_id, title)).await.unwrap();
    repo.update_article_text(owner, article_id, ARTICLE_TEXT.to_string())
        .await
        .unwrap();
    let id = repo
        .upsert_summary_status(owner, article_id, Tone::Neutral, SummaryStatus::Processing)
        .await
        .unwrap();
    repo.complete_summary(
        owner,
        &id,
        SummaryCompletion {
            summary: text.to_string(),
            rating: 3,
            rating_reason: "fine".into(),
            facts: Facts {
                main_claim: text.to_string(),
                ..Facts::default()
            },
            model: "claude-sonnet-4-20250514".into(),
            embedding,
        },
    )
    .await
    .unwrap();
    id
}
