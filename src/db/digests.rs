use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{Digest, DigestPeriod, OwnerId};

use super::repository::{db_time, json_column, parsed_column, time_column};
use super::Repository;

/// Generated digest content ready to be stored.
#[derive(Debug, Clone)]
pub struct DigestContent {
    pub content: String,
    pub summary_count: i64,
    pub top_themes: Vec<String>,
    pub model: String,
}

impl Repository {
    /// Insert or overwrite the digest for (owner, period).
    pub async fn upsert_digest(
        &self,
        owner: &OwnerId,
        period: DigestPeriod,
        digest: DigestContent,
    ) -> Result<i64> {
        let owner = owner.to_string();
        let themes = serde_json::to_string(&digest.top_themes)?;
        let now = db_time(Utc::now());
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"INSERT INTO digests (owner_id, period_type, period_start, period_end, content,
                                            summary_count, top_themes, model, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                       ON CONFLICT(owner_id, period_type, period_start, period_end) DO UPDATE SET
                           content = excluded.content,
                           summary_count = excluded.summary_count,
                           top_themes = excluded.top_themes,
                           model = excluded.model,
                           updated_at = excluded.updated_at
                       RETURNING id"#,
                    params![
                        owner,
                        period.period_type.as_str(),
                        period.start.to_string(),
                        period.end.to_string(),
                        digest.content,
                        digest.summary_count,
                        themes,
                        digest.model,
                        now,
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_digest(&self, owner: &OwnerId, period: DigestPeriod) -> Result<Option<Digest>> {
        let owner = owner.to_string();
        let digest = self
            .conn
            .call(move |conn| {
                let digest = conn
                    .query_row(
                        &format!(
                            r#"SELECT {} FROM digests
                               WHERE owner_id = ?1 AND period_type = ?2 AND period_start = ?3 AND period_end = ?4"#,
                            DIGEST_COLUMNS
                        ),
                        params![
                            owner,
                            period.period_type.as_str(),
                            period.start.to_string(),
                            period.end.to_string()
                        ],
                        digest_from_row,
                    )
                    .optional()?;
                Ok(digest)
            })
            .await?;
        Ok(digest)
    }

    pub async fn list_digests(&self, owner: &OwnerId) -> Result<Vec<Digest>> {
        let owner = owner.to_string();
        let digests = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM digests WHERE owner_id = ?1 ORDER BY period_start DESC",
                    DIGEST_COLUMNS
                ))?;
                let digests = stmt
                    .query_map(params![owner], digest_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(digests)
            })
            .await?;
        Ok(digests)
    }
}

const DIGEST_COLUMNS: &str = "id, owner_id, period_type, period_start, period_end, content, \
    summary_count, top_themes, model, created_at, updated_at";

fn digest_from_row(row: &Row) -> rusqlite::Result<Digest> {
    Ok(Digest {
        id: row.get(0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        period: DigestPeriod {
            period_type: parsed_column(row, 2)?,
            start: parsed_column::<NaiveDate>(row, 3)?,
            end: parsed_column::<NaiveDate>(row, 4)?,
        },
        content: row.get(5)?,
        summary_count: row.get(6)?,
        top_themes: json_column(row, 7)?.unwrap_or_default(),
        model: row.get(8)?,
        created_at: time_column(row, 9)?,
        updated_at: time_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str, count: i64) -> DigestContent {
        DigestContent {
            content: text.to_string(),
            summary_count: count,
            top_themes: vec!["AI".to_string()],
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }

    #[tokio::test]
    async fn test_regeneration_overwrites_in_place() {
        let repo = Repository::in_memory().await.unwrap();
        let owner = OwnerId::new("alice");
        let period = DigestPeriod::week_starting(NaiveDate::from_ymd_opt(2026, 10, 5).unwrap());

        let first = repo.upsert_digest(&owner, period, content("v1", 3)).await.unwrap();
        let second = repo.upsert_digest(&owner, period, content("v2", 4)).await.unwrap();
        assert_eq!(first, second);

        let digest = repo.get_digest(&owner, period).await.unwrap().unwrap();
        assert_eq!(digest.content, "v2");
        assert_eq!(digest.summary_count, 4);
        assert_eq!(digest.top_themes, vec!["AI".to_string()]);
        assert_eq!(repo.list_digests(&owner).await.unwrap().len(), 1);
    }
}
