use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub owner_id: OwnerId,
    pub remote_id: i64,
    pub title: String,
    pub url: String,
    /// Short excerpt from the bookmark, replaced by the full body once extracted.
    pub excerpt: Option<String>,
    pub cover_url: Option<String>,
    pub tags: Vec<String>,
    pub collection_id: Option<i64>,
    pub remote_created_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn text_len(&self) -> usize {
        self.excerpt.as_deref().map_or(0, |t| t.chars().count())
    }
}

/// A bookmark as fetched from the remote service, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub remote_id: i64,
    pub title: String,
    pub url: String,
    pub excerpt: Option<String>,
    pub cover_url: Option<String>,
    pub tags: Vec<String>,
    pub collection_id: Option<i64>,
    pub remote_created_at: Option<DateTime<Utc>>,
}
