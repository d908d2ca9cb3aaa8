use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Readable body of a web page as returned by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub language: Option<String>,
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, article_url: &str) -> Result<ExtractedContent>;
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    url: &'a str,
}

/// Client for the article extraction microservice (`POST {url}`).
pub struct ContentFetcher {
    client: Client,
    endpoint: String,
}

impl ContentFetcher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ContentExtractor for ContentFetcher {
    async fn extract(&self, article_url: &str) -> Result<ExtractedContent> {
        let url = Url::parse(article_url).map_err(|e| AppError::Extraction {
            status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            message: format!("invalid article URL {:?}: {}", article_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Extraction {
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                message: format!("unsupported URL scheme: {}", url.scheme()),
            });
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest { url: url.as_str() })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(url = %url, %status, "Extraction failed");
            return Err(AppError::Extraction {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }

        let content: ExtractedContent = response.json().await?;
        if content.text.trim().is_empty() {
            return Err(AppError::Extraction {
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                message: format!("no readable text at {}", url),
            });
        }
        Ok(content)
    }
}
