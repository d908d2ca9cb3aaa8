use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::ledger::{Ledger, TokenUsage};
use crate::models::{OwnerId, Provider};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Vector plus what the provider billed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub tokens: u64,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn embed(&self, api_key: &str, text: &str) -> Result<Embedding>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: Option<String>,
    #[serde(default)]
    usage: EmbeddingUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    prompt_tokens: u64,
}

/// OpenAI embeddings endpoint.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(OPENAI_EMBEDDINGS_URL, model)
    }

    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn embed(&self, api_key: &str, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::EmbeddingApi(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response.json().await?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::EmbeddingApi("No embedding returned from API".to_string()))?;

        Ok(Embedding {
            vector,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            tokens: body.usage.prompt_tokens,
        })
    }
}

/// Embedding calls with cost recording.
///
/// Embeddings enhance summaries but never gate them: with no key configured
/// the result is an empty vector.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    ledger: Ledger,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, ledger: Ledger) -> Self {
        Self { provider, ledger }
    }

    pub async fn embed(
        &self,
        owner: &OwnerId,
        text: &str,
        api_key: Option<&str>,
        summary_id: Option<&str>,
    ) -> Result<Vec<f32>> {
        let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
            tracing::debug!(owner = %owner, "No embedding key configured, skipping embedding");
            return Ok(Vec::new());
        };

        let embedding = self.provider.embed(api_key, text).await?;
        self.ledger
            .record_usage(
                owner,
                self.provider.provider(),
                &embedding.model,
                TokenUsage {
                    input_tokens: embedding.tokens,
                    output_tokens: 0,
                },
                summary_id,
            )
            .await?;
        Ok(embedding.vector)
    }
}

/// Cosine similarity in `[-1, 1]`. Empty, zero-norm or mismatched inputs give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 || !dot.is_finite() {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn embed(&self, _api_key: &str, _text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::EmbeddingApi("down".into()));
            }
            Ok(Embedding {
                vector: vec![1.0, 0.0],
                model: "text-embedding-3-small".into(),
                tokens: 50,
            })
        }
    }

    async fn embedder(fail: bool) -> (Embedder, Arc<FixedProvider>, Ledger) {
        let repo = Repository::in_memory().await.unwrap();
        let ledger = Ledger::new(repo, None);
        let provider = Arc::new(FixedProvider {
            calls: AtomicUsize::new(0),
            fail,
        });
        (Embedder::new(provider.clone(), ledger.clone()), provider, ledger)
    }

    #[test]
    fn test_cosine_of_vector_with_itself_is_one() {
        for v in [vec![1.0f32, 2.0, 3.0], vec![-0.3, 0.7], vec![1e-3, 5e3, -2.0]] {
            assert_eq!(cosine_similarity(&v, &v), 1.0);
        }
    }

    #[test]
    fn test_cosine_zero_and_empty_are_zero() {
        let zero = vec![0.0f32; 3];
        let v = vec![1.0f32, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&v, &[1.0, 2.0]), 0.0);
        assert!(!cosine_similarity(&zero, &zero).is_nan());
    }

    #[test]
    fn test_cosine_opposite_and_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_no_key_returns_empty_without_calling_provider() {
        let (embedder, provider, _) = embedder(false).await;
        let owner = OwnerId::new("alice");
        let vector = embedder.embed(&owner, "text", None, None).await.unwrap();
        assert!(vector.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_embed_records_usage() {
        let (embedder, _, ledger) = embedder(false).await;
        let owner = OwnerId::new("alice");
        let vector = embedder
            .embed(&owner, "text", Some("sk-embed"), Some("summary-1"))
            .await
            .unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(
            ledger.monthly_cost(&owner, chrono::Utc::now()).await.unwrap().micros(),
            1
        );
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_to_caller() {
        let (embedder, _, _) = embedder(true).await;
        let owner = OwnerId::new("alice");
        assert!(embedder.embed(&owner, "text", Some("sk"), None).await.is_err());
    }
}
