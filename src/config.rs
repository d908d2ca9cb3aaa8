use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::ledger::Usd;
use crate::models::JobKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Fallback credentials for owners that have none of their own.
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub raindrop_token: Option<String>,

    #[serde(default = "default_extraction_service_url")]
    pub extraction_service_url: String,

    /// Decimal USD; "0" disables the system-wide cap.
    #[serde(default = "default_monthly_budget")]
    pub default_monthly_budget_usd: String,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Fast tier used for fact extraction.
    pub facts_model: String,
    /// Strong tier used for the tone-specific summary.
    pub summary_model: String,
    pub digest_model: String,
    pub embedding_model: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            facts_model: "claude-3-5-haiku-20241022".to_string(),
            summary_model: "claude-sonnet-4-20250514".to_string(),
            digest_model: "claude-sonnet-4-20250514".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub max_in_flight: usize,
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_in_flight: 32,
            retry_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub similarity_threshold: f32,
    pub centroid_sample_size: usize,
    pub min_new_theme_batch: usize,
    pub write_batch_size: usize,
    pub max_iterations: usize,
    pub max_clusters: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            centroid_sample_size: 20,
            min_new_theme_batch: 3,
            write_batch_size: 50,
            max_iterations: 100,
            max_clusters: 8,
        }
    }
}

/// Concurrency caps and retry budget for one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLimits {
    pub global: usize,
    pub per_owner: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl JobLimits {
    pub const fn new(global: usize, per_owner: usize, max_retries: u32) -> Self {
        Self {
            global,
            per_owner,
            max_retries,
        }
    }

    pub fn defaults_for(kind: JobKind) -> Self {
        match kind {
            JobKind::Import => Self::new(5, 1, 3),
            JobKind::Extract => Self::new(5, 2, 2),
            JobKind::Summarize => Self::new(5, 2, 4),
            JobKind::ClassifyThemes => Self::new(5, 1, 2),
            JobKind::WeeklyDigest => Self::new(5, 1, 2),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// `[limits.<job>]` tables; a missing table keeps that job's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "import_limits")]
    pub import: JobLimits,
    #[serde(default = "extract_limits")]
    pub extract: JobLimits,
    #[serde(default = "summarize_limits")]
    pub summarize: JobLimits,
    #[serde(default = "classify_limits")]
    pub classify_themes: JobLimits,
    #[serde(default = "digest_limits")]
    pub weekly_digest: JobLimits,
}

impl LimitsConfig {
    pub fn get(&self, kind: JobKind) -> JobLimits {
        match kind {
            JobKind::Import => self.import,
            JobKind::Extract => self.extract,
            JobKind::Summarize => self.summarize,
            JobKind::ClassifyThemes => self.classify_themes,
            JobKind::WeeklyDigest => self.weekly_digest,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            import: import_limits(),
            extract: extract_limits(),
            summarize: summarize_limits(),
            classify_themes: classify_limits(),
            weekly_digest: digest_limits(),
        }
    }
}

fn import_limits() -> JobLimits {
    JobLimits::defaults_for(JobKind::Import)
}

fn extract_limits() -> JobLimits {
    JobLimits::defaults_for(JobKind::Extract)
}

fn summarize_limits() -> JobLimits {
    JobLimits::defaults_for(JobKind::Summarize)
}

fn classify_limits() -> JobLimits {
    JobLimits::defaults_for(JobKind::ClassifyThemes)
}

fn digest_limits() -> JobLimits {
    JobLimits::defaults_for(JobKind::WeeklyDigest)
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speedy-digest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("digest.db").to_string_lossy().to_string()
}

fn default_extraction_service_url() -> String {
    "http://localhost:8000/extract".to_string()
}

fn default_monthly_budget() -> String {
    "10.00".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            claude_api_key: None,
            openai_api_key: None,
            raindrop_token: None,
            extraction_service_url: default_extraction_service_url(),
            default_monthly_budget_usd: default_monthly_budget(),
            models: ModelsConfig::default(),
            worker: WorkerConfig::default(),
            clustering: ClusteringConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speedy-digest")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        self.default_monthly_budget()?;
        let c = &self.clustering;
        if !(0.0..=1.0).contains(&c.similarity_threshold) {
            return Err(AppError::Config(format!(
                "clustering.similarity_threshold must be within 0..=1, got {}",
                c.similarity_threshold
            )));
        }
        if c.centroid_sample_size == 0 || c.write_batch_size == 0 || c.max_clusters == 0 {
            return Err(AppError::Config(
                "clustering sizes must be greater than zero".to_string(),
            ));
        }
        for kind in JobKind::ALL {
            let limits = self.limits.get(kind);
            if limits.global == 0 || limits.per_owner == 0 {
                return Err(AppError::Config(format!(
                    "limits.{}: concurrency caps must be greater than zero",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// System-wide monthly cap, `None` when not positive.
    pub fn default_monthly_budget(&self) -> Result<Option<Usd>> {
        let budget: Usd = self.default_monthly_budget_usd.parse().map_err(|_| {
            AppError::Config(format!(
                "default_monthly_budget_usd is not a decimal amount: {:?}",
                self.default_monthly_budget_usd
            ))
        })?;
        Ok(Some(budget).filter(|b| b.is_positive()))
    }

    pub fn limits_for(&self, kind: JobKind) -> JobLimits {
        self.limits.get(kind)
    }
}
