use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::NewArticle;

const RAINDROP_API_URL: &str = "https://api.raindrop.io/rest/v1";
/// Raindrop's pseudo-collection containing every bookmark.
pub const ALL_COLLECTIONS: i64 = 0;
const PAGE_SIZE: usize = 50;
/// Stop paging after this many pages even if the API keeps answering.
const MAX_PAGES: usize = 200;

/// Remote bookmarking service.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Every bookmark in `collection` (all collections when `None`), across all pages.
    async fn fetch_bookmarks(&self, token: &str, collection: Option<i64>) -> Result<Vec<NewArticle>>;
}

#[derive(Debug, Deserialize)]
struct RaindropsResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    items: Vec<RaindropItem>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RaindropItem {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    collection: Option<CollectionRef>,
}

#[derive(Debug, Deserialize)]
struct CollectionRef {
    #[serde(rename = "$id")]
    id: i64,
}

impl From<RaindropItem> for NewArticle {
    fn from(item: RaindropItem) -> Self {
        let title = if item.title.trim().is_empty() {
            item.link.clone()
        } else {
            item.title
        };
        NewArticle {
            remote_id: item.id,
            title,
            url: item.link,
            excerpt: item.excerpt.filter(|e| !e.trim().is_empty()),
            cover_url: item.cover.filter(|c| !c.is_empty()),
            tags: item.tags,
            collection_id: item.collection.map(|c| c.id),
            remote_created_at: item.created,
        }
    }
}

pub struct RaindropClient {
    client: Client,
    base_url: String,
}

impl RaindropClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(RAINDROP_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_page(&self, token: &str, collection: i64, page: usize) -> Result<RaindropsResponse> {
        let response = self
            .client
            .get(format!("{}/raindrops/{}", self.base_url, collection))
            .query(&[("page", page), ("perpage", PAGE_SIZE)])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::RaindropApi(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: RaindropsResponse = response.json().await?;
        if !body.result {
            return Err(AppError::RaindropApi(
                body.error_message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl BookmarkSource for RaindropClient {
    async fn fetch_bookmarks(&self, token: &str, collection: Option<i64>) -> Result<Vec<NewArticle>> {
        let collection = collection.unwrap_or(ALL_COLLECTIONS);
        let mut bookmarks = Vec::new();

        for page in 0..MAX_PAGES {
            let body = self.fetch_page(token, collection, page).await?;
            let received = body.items.len();
            bookmarks.extend(body.items.into_iter().map(NewArticle::from));

            let exhausted = body.count.is_some_and(|count| bookmarks.len() >= count);
            if received < PAGE_SIZE || exhausted {
                break;
            }
        }

        tracing::debug!(collection, count = bookmarks.len(), "Fetched bookmarks");
        Ok(bookmarks)
    }
}
