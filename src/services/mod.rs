mod content_fetcher;
pub mod notifier;
mod raindrop;

pub use content_fetcher::{ContentExtractor, ContentFetcher, ExtractedContent};
pub use notifier::{BroadcastNotifier, ChannelMessage, Notifications, Notifier};
pub use raindrop::{BookmarkSource, RaindropClient, ALL_COLLECTIONS};
