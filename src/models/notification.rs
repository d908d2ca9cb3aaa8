use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub owner_id: OwnerId,
    pub event: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
