use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Snarky,
    Enthusiastic,
    Casual,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Neutral, Tone::Snarky, Tone::Enthusiastic, Tone::Casual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Snarky => "snarky",
            Tone::Enthusiastic => "enthusiastic",
            Tone::Casual => "casual",
        }
    }

    /// Register the summary is written in. Only phrasing changes between tones.
    pub fn register(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral and factual, no opinion beyond what the facts support",
            Tone::Snarky => "snarky and critical, poking at weak claims with dry wit",
            Tone::Enthusiastic => "enthusiastic and positive, highlighting what is exciting",
            Tone::Casual => "casual and conversational, like telling a friend about it",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::Invalid(format!("unknown tone: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Processing => "processing",
            SummaryStatus::Completed => "completed",
            SummaryStatus::Failed => "failed",
        }
    }
}

impl FromStr for SummaryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SummaryStatus::Pending),
            "processing" => Ok(SummaryStatus::Processing),
            "completed" => Ok(SummaryStatus::Completed),
            "failed" => Ok(SummaryStatus::Failed),
            other => Err(AppError::Invalid(format!("unknown summary status: {}", other))),
        }
    }
}

/// Structured extraction feeding the tone-specific summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    #[serde(default)]
    pub key_points: Vec<String>,
    pub main_claim: String,
    #[serde(default)]
    pub caveats: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Facts {
    pub fn validate(self) -> Result<Self, AppError> {
        if self.main_claim.trim().is_empty() {
            return Err(AppError::InvalidResponse(
                "facts are missing main_claim".to_string(),
            ));
        }
        Ok(self)
    }
}

/// What the summary stage must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub summary: String,
    pub rating: i64,
    #[serde(default)]
    pub rating_reason: String,
}

impl SummaryOutput {
    pub fn validate(self) -> Result<Self, AppError> {
        if self.summary.trim().is_empty() {
            return Err(AppError::InvalidResponse("summary text is empty".to_string()));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::InvalidResponse(format!(
                "rating {} outside 1-5",
                self.rating
            )));
        }
        Ok(self)
    }
}

/// End-user feedback on an earlier summary, used to steer regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryFeedback {
    pub rating: Option<i64>,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub owner_id: OwnerId,
    pub article_id: i64,
    pub tone: Tone,
    pub summary: Option<String>,
    pub rating: Option<i64>,
    pub rating_reason: Option<String>,
    pub facts: Option<Facts>,
    pub model: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub theme: Option<String>,
    pub status: SummaryStatus,
    pub error_message: Option<String>,
    pub user_rating: Option<i64>,
    pub user_feedback: Option<String>,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Summary {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_round_trips_through_str() {
        for tone in Tone::ALL {
            assert_eq!(tone.as_str().parse::<Tone>().unwrap(), tone);
        }
        assert!("angry".parse::<Tone>().is_err());
    }

    #[test]
    fn test_summary_output_rating_bounds() {
        let ok = SummaryOutput {
            summary: "text".into(),
            rating: 5,
            rating_reason: String::new(),
        };
        assert!(ok.validate().is_ok());

        let zero = SummaryOutput {
            summary: "text".into(),
            rating: 0,
            rating_reason: String::new(),
        };
        assert!(matches!(zero.validate(), Err(AppError::InvalidResponse(_))));
    }

    #[test]
    fn test_facts_optional_lists_default() {
        let facts: Facts = serde_json::from_str(r#"{"main_claim": "Rust is fast"}"#).unwrap();
        assert!(facts.key_points.is_empty());
        assert!(facts.keywords.is_empty());
        assert!(facts.validate().is_ok());
    }

    #[test]
    fn test_facts_require_main_claim() {
        assert!(serde_json::from_str::<Facts>(r#"{"key_points": []}"#).is_err());
        let blank = Facts {
            main_claim: "  ".into(),
            ..Facts::default()
        };
        assert!(blank.validate().is_err());
    }
}
