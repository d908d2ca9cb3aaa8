use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ModelsConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::{Facts, OwnerId, SummaryFeedback, SummaryOutput, Tone};

use super::chat::{ChatCompletion, ChatModel, ChatRequest};
use super::json::parse_model_json;
use super::prompts::{self, DigestItem};

/// Generated summary plus the model that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSummary {
    pub output: SummaryOutput,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDigest {
    pub content: String,
    pub model: String,
}

/// The paid generative stages. Every call is recorded in the ledger before its
/// reply is parsed, so malformed replies are still billed.
#[derive(Clone)]
pub struct Summarizer {
    chat: Arc<dyn ChatModel>,
    ledger: Ledger,
    models: ModelsConfig,
}

impl Summarizer {
    pub fn new(chat: Arc<dyn ChatModel>, ledger: Ledger, models: ModelsConfig) -> Self {
        Self {
            chat,
            ledger,
            models,
        }
    }

    /// Stage A: structured facts with the fast model tier.
    pub async fn extract_facts(
        &self,
        owner: &OwnerId,
        api_key: &str,
        summary_id: Option<&str>,
        title: &str,
        text: &str,
    ) -> Result<Facts> {
        let request = ChatRequest {
            model: self.models.facts_model.clone(),
            system: Some(prompts::FACTS_SYSTEM.to_string()),
            prompt: prompts::facts_prompt(title, text),
            max_tokens: 1024,
        };
        let completion = self.complete(owner, api_key, summary_id, request).await?;
        parse_model_json::<Facts>(&completion.text)?.validate()
    }

    /// Stage B: the tone-specific summary with the strong model tier.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_summary(
        &self,
        owner: &OwnerId,
        api_key: &str,
        summary_id: Option<&str>,
        title: &str,
        facts: &Facts,
        tone: Tone,
        feedback: &[SummaryFeedback],
    ) -> Result<GeneratedSummary> {
        let request = ChatRequest {
            model: self.models.summary_model.clone(),
            system: Some(prompts::SUMMARY_SYSTEM.to_string()),
            prompt: prompts::summary_prompt(title, facts, tone, feedback),
            max_tokens: 1024,
        };
        let completion = self.complete(owner, api_key, summary_id, request).await?;
        let output = parse_model_json::<SummaryOutput>(&completion.text)?.validate()?;
        Ok(GeneratedSummary {
            output,
            model: completion.model,
        })
    }

    /// One meta-summary over a week of summaries, as Markdown.
    pub async fn generate_digest(
        &self,
        owner: &OwnerId,
        api_key: &str,
        period_label: &str,
        top_themes: &[String],
        items: &[DigestItem],
    ) -> Result<GeneratedDigest> {
        let request = ChatRequest {
            model: self.models.digest_model.clone(),
            system: Some(prompts::DIGEST_SYSTEM.to_string()),
            prompt: prompts::digest_prompt(period_label, top_themes, items),
            max_tokens: 2048,
        };
        let completion = self.complete(owner, api_key, None, request).await?;
        Ok(GeneratedDigest {
            content: completion.text.trim().to_string(),
            model: completion.model,
        })
    }

    async fn complete(
        &self,
        owner: &OwnerId,
        api_key: &str,
        summary_id: Option<&str>,
        request: ChatRequest,
    ) -> Result<ChatCompletion> {
        let completion = self.chat.complete(api_key, request).await?;
        self.ledger
            .record_usage(
                owner,
                self.chat.provider(),
                &completion.model,
                completion.usage,
                summary_id,
            )
            .await?;
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use crate::error::AppError;
    use crate::ledger::{TokenUsage, Usd};
    use crate::models::Provider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn complete(&self, _api_key: &str, request: ChatRequest) -> Result<ChatCompletion> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let text = self.replies.lock().unwrap().remove(0);
            Ok(ChatCompletion {
                text,
                model,
                usage: TokenUsage {
                    input_tokens: 1_000,
                    output_tokens: 500,
                },
            })
        }
    }

    async fn summarizer(replies: &[&str]) -> (Summarizer, Arc<ScriptedChat>, Ledger) {
        let repo = Repository::in_memory().await.unwrap();
        let ledger = Ledger::new(repo, None);
        let chat = Arc::new(ScriptedChat {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        });
        let summarizer = Summarizer::new(chat.clone(), ledger.clone(), ModelsConfig::default());
        (summarizer, chat, ledger)
    }

    #[tokio::test]
    async fn test_facts_use_fast_model_and_accept_fenced_json() {
        let (summarizer, chat, ledger) = summarizer(&[
            "```json\n{\"main_claim\": \"Rust is fast\", \"keywords\": [\"rust\"]}\n```",
        ])
        .await;
        let owner = OwnerId::new("alice");

        let facts = summarizer
            .extract_facts(&owner, "sk", Some("s1"), "Title", "Body")
            .await
            .unwrap();
        assert_eq!(facts.main_claim, "Rust is fast");
        assert_eq!(
            chat.requests.lock().unwrap()[0].model,
            "claude-3-5-haiku-20241022"
        );
        // 1000 in at $0.80/M + 500 out at $4/M
        assert_eq!(
            ledger.monthly_cost(&owner, chrono::Utc::now()).await.unwrap(),
            Usd::from_micros(2_800)
        );
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_still_billed() {
        let (summarizer, _, ledger) = summarizer(&["I could not read that article."]).await;
        let owner = OwnerId::new("alice");

        let err = summarizer
            .extract_facts(&owner, "sk", None, "Title", "Body")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
        assert!(err.is_retriable());
        assert!(ledger
            .monthly_cost(&owner, chrono::Utc::now())
            .await
            .unwrap()
            .is_positive());
    }

    #[tokio::test]
    async fn test_summary_rating_out_of_range_rejected() {
        let (summarizer, _, _) =
            summarizer(&[r#"{"summary": "ok", "rating": 9, "rating_reason": "wow"}"#]).await;
        let facts = Facts {
            main_claim: "claim".into(),
            ..Facts::default()
        };
        let result = summarizer
            .generate_summary(&OwnerId::new("alice"), "sk", None, "T", &facts, Tone::Casual, &[])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_digest_uses_digest_model() {
        let (summarizer, chat, _) = summarizer(&["## Trend\nQuiet week.\n"]).await;
        let digest = summarizer
            .generate_digest(&OwnerId::new("alice"), "sk", "week", &[], &[])
            .await
            .unwrap();
        assert_eq!(digest.content, "## Trend\nQuiet week.");
        assert_eq!(chat.requests.lock().unwrap()[0].max_tokens, 2048);
    }
}
