use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::TokenUsage;
use crate::models::Provider;

/// One single-turn chat request expecting a JSON or Markdown reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub text: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: TokenUsage,
}

/// A generative-text provider. Credentials are per call because every owner
/// brings their own key.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, api_key: &str, request: ChatRequest) -> Result<ChatCompletion>;
}
