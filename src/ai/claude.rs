use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::chat::{ChatCompletion, ChatModel, ChatRequest};
use crate::error::{AppError, Result};
use crate::ledger::TokenUsage;
use crate::models::Provider;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic Messages API client.
pub struct ClaudeClient {
    client: Client,
    base_url: String,
}

impl ClaudeClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(CLAUDE_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ChatModel for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, api_key: &str, request: ChatRequest) -> Result<ChatCompletion> {
        let body = MessageRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            system: request.system.as_deref(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::GenerativeApi(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let message_response: MessageResponse = response.json().await?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ChatCompletion {
            text,
            model: message_response.model.unwrap_or(request.model),
            usage: TokenUsage {
                input_tokens: message_response.usage.input_tokens,
                output_tokens: message_response.usage.output_tokens,
            },
        })
    }
}
