//! Cost tracking: per-call pricing, the append-only usage ledger and the
//! monthly budget guardrail that gates paid generative calls.

mod money;
mod pricing;

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewUsageRecord, OwnerId, Provider, UsageRecord};

pub use money::Usd;
pub use pricing::{cost, price_for, ModelPrice};

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone)]
pub struct Ledger {
    repo: Repository,
    default_budget: Option<Usd>,
}

impl Ledger {
    /// `default_budget` applies to owners without a positive cap of their own;
    /// a non-positive default means no system cap.
    pub fn new(repo: Repository, default_budget: Option<Usd>) -> Self {
        Self {
            repo,
            default_budget: default_budget.filter(|b| b.is_positive()),
        }
    }

    /// Append a usage row with its cost computed from the price table.
    pub async fn record_usage(
        &self,
        owner: &OwnerId,
        provider: Provider,
        model: &str,
        tokens: TokenUsage,
        summary_id: Option<&str>,
    ) -> Result<UsageRecord> {
        let cost = cost(model, tokens.input_tokens, tokens.output_tokens);
        let created_at = Utc::now();
        let record = NewUsageRecord {
            owner_id: owner.clone(),
            summary_id: summary_id.map(String::from),
            provider,
            model: model.to_string(),
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
            cost,
            created_at,
        };
        let id = self.repo.insert_usage(record.clone()).await?;

        tracing::debug!(
            owner = %owner,
            %provider,
            model,
            input_tokens = tokens.input_tokens,
            output_tokens = tokens.output_tokens,
            cost = %cost,
            "Recorded usage"
        );

        Ok(UsageRecord {
            id,
            owner_id: record.owner_id,
            summary_id: record.summary_id,
            provider,
            model: record.model,
            input_tokens: record.input_tokens,
            output_tokens: record.output_tokens,
            cost,
            created_at,
        })
    }

    /// Total spent from the first of `as_of`'s month (UTC) through `as_of`.
    pub async fn monthly_cost(&self, owner: &OwnerId, as_of: DateTime<Utc>) -> Result<Usd> {
        let records = self
            .repo
            .usage_between(owner, month_start(as_of), as_of)
            .await?;
        Ok(records.into_iter().map(|r| r.cost).sum())
    }

    /// Month-to-date cost grouped by provider and model.
    pub async fn monthly_breakdown(
        &self,
        owner: &OwnerId,
        as_of: DateTime<Utc>,
    ) -> Result<BTreeMap<(String, String), Usd>> {
        let records = self
            .repo
            .usage_between(owner, month_start(as_of), as_of)
            .await?;
        let mut breakdown = BTreeMap::new();
        for record in records {
            *breakdown
                .entry((record.provider.to_string(), record.model))
                .or_insert(Usd::ZERO) += record.cost;
        }
        Ok(breakdown)
    }

    /// The owner's cap if positive, else the system default, else no cap.
    pub async fn monthly_budget(&self, owner: &OwnerId) -> Result<Option<Usd>> {
        let settings = self.repo.get_user_settings(owner).await?;
        Ok(settings
            .monthly_budget
            .filter(|b| b.is_positive())
            .or(self.default_budget))
    }

    /// Guardrail run before any paid generative call.
    pub async fn check_budget(&self, owner: &OwnerId, now: DateTime<Utc>) -> Result<()> {
        let Some(cap) = self.monthly_budget(owner).await? else {
            return Ok(());
        };
        let spent = self.monthly_cost(owner, now).await?;
        if spent >= cap {
            tracing::warn!(owner = %owner, spent = %spent, cap = %cap, "Monthly budget exhausted");
            return Err(AppError::BudgetExceeded { spent, cap });
        }
        Ok(())
    }
}

fn month_start(as_of: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(as_of.year(), as_of.month(), 1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(as_of)
}
