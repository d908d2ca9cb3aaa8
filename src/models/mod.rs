mod article;
mod digest;
mod job;
mod notification;
mod summary;
mod usage;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use article::{Article, NewArticle};
pub use digest::{Digest, DigestPeriod, PeriodType};
pub use job::{ClaimFilter, Job, JobKind, JobStatus, NewJob};
pub use notification::Notification;
pub use summary::{Facts, Summary, SummaryFeedback, SummaryOutput, SummaryStatus, Tone};
pub use usage::{NewUsageRecord, Provider, UsageRecord};

/// The end-user every record and job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Realtime channel the owner's notifications are published on.
    pub fn channel(&self) -> String {
        format!("user:{}", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-owner settings and credentials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSettings {
    pub owner_id: Option<OwnerId>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub raindrop_token: Option<String>,
    pub monthly_budget: Option<crate::ledger::Usd>,
    pub default_tone: Tone,
    pub utc_offset_minutes: i32,
}
