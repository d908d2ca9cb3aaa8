use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::db::Repository;
use crate::error::Result;
use crate::models::OwnerId;

pub const IMPORT_COMPLETED: &str = "import:completed";
pub const SUMMARY_COMPLETED: &str = "summary:completed";
pub const SUMMARY_FAILED: &str = "summary:failed";
pub const THEMES_COMPLETED: &str = "themes:completed";
pub const THEMES_FAILED: &str = "themes:failed";
pub const DIGEST_COMPLETED: &str = "digest:completed";

/// One message on an owner's realtime channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: String,
    pub data: Value,
    pub occurred_at: DateTime<Utc>,
}

/// Realtime fan-out to connected clients.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, data: &Value) -> Result<()>;
}

/// In-process fan-out; subscribers filter by channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ChannelMessage>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, channel: &str, event: &str, data: &Value) -> Result<()> {
        let message = ChannelMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            data: data.clone(),
            occurred_at: Utc::now(),
        };
        tracing::debug!(
            channel,
            event,
            subscriber_count = self.tx.receiver_count(),
            "Publishing notification"
        );
        // No subscribers is not an error.
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// Persists every domain event to the owner's inbox and publishes it on the
/// owner's channel. Both are best-effort and independent of each other.
#[derive(Clone)]
pub struct Notifications {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    pub async fn notify(&self, owner: &OwnerId, event: &str, data: Value) {
        if let Err(e) = self.repo.insert_notification(owner, event, &data).await {
            tracing::warn!(owner = %owner, event, error = %e, "Failed to store notification");
        }
        if let Err(e) = self.notifier.publish(&owner.channel(), event, &data).await {
            tracing::warn!(owner = %owner, event, error = %e, "Failed to publish notification");
        }
    }
}
