use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::clustering::ThemeDocument;
use crate::error::{AppError, Result};
use crate::models::{Facts, OwnerId, Summary, SummaryFeedback, SummaryStatus, Tone};

use super::repository::{db_time, json_column, opt_time_column, parsed_column, time_column};
use super::Repository;

/// Final fields written when a summary completes.
#[derive(Debug, Clone)]
pub struct SummaryCompletion {
    pub summary: String,
    pub rating: i64,
    pub rating_reason: String,
    pub facts: Facts,
    pub model: String,
    pub embedding: Vec<f32>,
}

/// A completed summary together with the title of its article.
#[derive(Debug, Clone)]
pub struct TitledSummary {
    pub title: String,
    pub summary: Summary,
}

impl Repository {
    /// Create or reset the live summary for (owner, article, tone).
    ///
    /// Backed by a partial unique index, so concurrent callers converge on one row.
    pub async fn upsert_summary_status(
        &self,
        owner: &OwnerId,
        article_id: i64,
        tone: Tone,
        status: SummaryStatus,
    ) -> Result<String> {
        let owner = owner.to_string();
        let new_id = Uuid::new_v4().to_string();
        let now = db_time(Utc::now());
        let id = self
            .conn
            .call(move |conn| {
                let id: String = conn.query_row(
                    r#"INSERT INTO summaries (id, owner_id, article_id, tone, status, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                       ON CONFLICT(owner_id, article_id, tone) WHERE deleted_at IS NULL DO UPDATE SET
                           status = excluded.status,
                           error_message = NULL,
                           updated_at = excluded.updated_at
                       RETURNING id"#,
                    params![new_id, owner, article_id, tone.as_str(), status.as_str(), now],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Move an existing summary to `status`, clearing any previous error.
    pub async fn set_summary_status(
        &self,
        owner: &OwnerId,
        id: &str,
        status: SummaryStatus,
    ) -> Result<()> {
        let owner_key = owner.to_string();
        let key = id.to_string();
        let now = db_time(Utc::now());
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE summaries SET status = ?1, error_message = NULL, updated_at = ?2
                       WHERE id = ?3 AND owner_id = ?4 AND deleted_at IS NULL"#,
                    params![status.as_str(), now, key, owner_key],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("summary {}", id)));
        }
        Ok(())
    }

    pub async fn complete_summary(
        &self,
        owner: &OwnerId,
        id: &str,
        completion: SummaryCompletion,
    ) -> Result<()> {
        let owner = owner.to_string();
        let id = id.to_string();
        let facts = serde_json::to_string(&completion.facts)?;
        let embedding = if completion.embedding.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&completion.embedding)?)
        };
        let now = db_time(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE summaries SET
                           summary = ?1, rating = ?2, rating_reason = ?3, facts = ?4, model = ?5,
                           embedding = ?6, theme = NULL, status = 'completed', error_message = NULL,
                           completed_at = ?7, updated_at = ?7
                       WHERE id = ?8 AND owner_id = ?9"#,
                    params![
                        completion.summary,
                        completion.rating,
                        completion.rating_reason,
                        facts,
                        completion.model,
                        embedding,
                        now,
                        id,
                        owner,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_summary_failed(&self, owner: &OwnerId, id: &str, message: &str) -> Result<bool> {
        let owner = owner.to_string();
        let id = id.to_string();
        let message = message.to_string();
        let now = db_time(Utc::now());
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE summaries SET status = 'failed', error_message = ?1, updated_at = ?2
                       WHERE id = ?3 AND owner_id = ?4"#,
                    params![message, now, id, owner],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(updated)
    }

    pub async fn get_summary(&self, owner: &OwnerId, id: &str) -> Result<Option<Summary>> {
        let owner = owner.to_string();
        let id = id.to_string();
        let summary = self
            .conn
            .call(move |conn| {
                let summary = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM summaries WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
                            SUMMARY_COLUMNS
                        ),
                        params![id, owner],
                        summary_from_row,
                    )
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    pub async fn find_summary(
        &self,
        owner: &OwnerId,
        article_id: i64,
        tone: Tone,
    ) -> Result<Option<Summary>> {
        let owner = owner.to_string();
        let summary = self
            .conn
            .call(move |conn| {
                let summary = conn
                    .query_row(
                        &format!(
                            r#"SELECT {} FROM summaries
                               WHERE owner_id = ?1 AND article_id = ?2 AND tone = ?3 AND deleted_at IS NULL"#,
                            SUMMARY_COLUMNS
                        ),
                        params![owner, article_id, tone.as_str()],
                        summary_from_row,
                    )
                    .optional()?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    pub async fn list_summaries(&self, owner: &OwnerId) -> Result<Vec<Summary>> {
        let owner = owner.to_string();
        let summaries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM summaries
                       WHERE owner_id = ?1 AND deleted_at IS NULL
                       ORDER BY created_at DESC"#,
                    SUMMARY_COLUMNS
                ))?;
                let summaries = stmt
                    .query_map(params![owner], summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }

    /// Store the owner's verdict on a summary.
    pub async fn submit_feedback(
        &self,
        owner: &OwnerId,
        id: &str,
        rating: Option<i64>,
        feedback: Option<String>,
    ) -> Result<()> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(AppError::Invalid(format!("rating {} outside 1-5", r)));
            }
        }
        let owner_key = owner.to_string();
        let key = id.to_string();
        let now = db_time(Utc::now());
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE summaries SET user_rating = ?1, user_feedback = ?2, updated_at = ?3
                       WHERE id = ?4 AND owner_id = ?5 AND deleted_at IS NULL"#,
                    params![rating, feedback, now, key, owner_key],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("summary {}", id)));
        }
        Ok(())
    }

    /// The owner's most recent written feedback for one tone.
    pub async fn recent_feedback(
        &self,
        owner: &OwnerId,
        tone: Tone,
        limit: usize,
    ) -> Result<Vec<SummaryFeedback>> {
        let owner = owner.to_string();
        let feedback = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_rating, user_feedback FROM summaries
                       WHERE owner_id = ?1 AND tone = ?2
                         AND user_feedback IS NOT NULL AND TRIM(user_feedback) != ''
                       ORDER BY updated_at DESC
                       LIMIT ?3"#,
                )?;
                let feedback = stmt
                    .query_map(params![owner, tone.as_str(), limit as i64], |row| {
                        Ok(SummaryFeedback {
                            rating: row.get(0)?,
                            feedback: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feedback)
            })
            .await?;
        Ok(feedback)
    }

    // Theme operations

    /// Completed, embedded summaries as clustering input.
    pub async fn theme_documents(&self, owner: &OwnerId, unlabeled_only: bool) -> Result<Vec<ThemeDocument>> {
        let owner = owner.to_string();
        let docs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT s.id, a.title, s.summary, s.embedding, s.theme
                       FROM summaries s JOIN articles a ON a.id = s.article_id AND a.owner_id = s.owner_id
                       WHERE s.owner_id = ?1 AND s.deleted_at IS NULL AND s.status = 'completed'
                         AND s.embedding IS NOT NULL
                         AND (?2 = 0 OR s.theme IS NULL)
                       ORDER BY s.created_at, s.id"#,
                )?;
                let docs = stmt
                    .query_map(params![owner, unlabeled_only], |row| {
                        let title: String = row.get(1)?;
                        let summary: Option<String> = row.get(2)?;
                        Ok(ThemeDocument {
                            summary_id: row.get(0)?,
                            text: format!("{}\n{}", title, summary.unwrap_or_default()),
                            embedding: json_column(row, 3)?.unwrap_or_default(),
                            theme: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(docs)
            })
            .await?;
        Ok(docs)
    }

    /// Distinct theme labels, most used first (ties alphabetical).
    pub async fn existing_themes(&self, owner: &OwnerId) -> Result<Vec<String>> {
        let owner = owner.to_string();
        let themes = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT theme FROM summaries
                       WHERE owner_id = ?1 AND deleted_at IS NULL AND theme IS NOT NULL
                       GROUP BY theme
                       ORDER BY COUNT(*) DESC, theme"#,
                )?;
                let themes = stmt
                    .query_map(params![owner], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(themes)
            })
            .await?;
        Ok(themes)
    }

    /// Embeddings of up to `limit` recent members of a theme.
    pub async fn theme_sample_embeddings(
        &self,
        owner: &OwnerId,
        theme: &str,
        limit: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let owner = owner.to_string();
        let theme = theme.to_string();
        let vectors = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT embedding FROM summaries
                       WHERE owner_id = ?1 AND theme = ?2 AND deleted_at IS NULL AND embedding IS NOT NULL
                       ORDER BY updated_at DESC
                       LIMIT ?3"#,
                )?;
                let vectors = stmt
                    .query_map(params![owner, theme, limit as i64], |row| {
                        Ok(json_column::<Vec<f32>>(row, 0)?.unwrap_or_default())
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(vectors)
            })
            .await?;
        Ok(vectors.into_iter().filter(|v| !v.is_empty()).collect())
    }

    pub async fn set_theme(&self, owner: &OwnerId, summary_id: &str, theme: &str) -> Result<bool> {
        let owner = owner.to_string();
        let id = summary_id.to_string();
        let theme = theme.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE summaries SET theme = ?1 WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
                    params![theme, id, owner],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(updated)
    }

    /// Clear every label so the next classification clusters from scratch.
    pub async fn reset_themes(&self, owner: &OwnerId) -> Result<usize> {
        let owner = owner.to_string();
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE summaries SET theme = NULL WHERE owner_id = ?1 AND theme IS NOT NULL",
                    params![owner],
                )?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    // Digest and search inputs

    /// Summaries that completed in `[from, to)`, most recently completed first.
    pub async fn completed_summaries_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TitledSummary>> {
        let owner = owner.to_string();
        let (from, to) = (db_time(from), db_time(to));
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT a.title, {} FROM summaries s
                       JOIN articles a ON a.id = s.article_id AND a.owner_id = s.owner_id
                       WHERE s.owner_id = ?1 AND s.deleted_at IS NULL AND s.status = 'completed'
                         AND s.completed_at >= ?2 AND s.completed_at < ?3
                       ORDER BY s.completed_at DESC
                       LIMIT ?4"#,
                    SUMMARY_COLUMNS_S
                ))?;
                let rows = stmt
                    .query_map(params![owner, from, to, limit as i64], titled_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Every completed summary carrying an embedding.
    pub async fn embedded_summaries(&self, owner: &OwnerId) -> Result<Vec<TitledSummary>> {
        let owner = owner.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT a.title, {} FROM summaries s
                       JOIN articles a ON a.id = s.article_id AND a.owner_id = s.owner_id
                       WHERE s.owner_id = ?1 AND s.deleted_at IS NULL AND s.status = 'completed'
                         AND s.embedding IS NOT NULL AND a.deleted_at IS NULL"#,
                    SUMMARY_COLUMNS_S
                ))?;
                let rows = stmt
                    .query_map(params![owner], titled_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Owners with at least one summary completed in `[from, to)`.
    pub async fn owners_with_completed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OwnerId>> {
        let (from, to) = (db_time(from), db_time(to));
        let owners = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT DISTINCT owner_id FROM summaries
                       WHERE deleted_at IS NULL AND status = 'completed'
                         AND completed_at >= ?1 AND completed_at < ?2
                       ORDER BY owner_id"#,
                )?;
                let owners = stmt
                    .query_map(params![from, to], |row| Ok(OwnerId::new(row.get::<_, String>(0)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(owners)
            })
            .await?;
        Ok(owners)
    }
}

const SUMMARY_COLUMNS: &str = "id, owner_id, article_id, tone, summary, rating, rating_reason, facts, \
    model, embedding, theme, status, error_message, user_rating, user_feedback, is_public, deleted_at, \
    created_at, updated_at";

const SUMMARY_COLUMNS_S: &str = "s.id, s.owner_id, s.article_id, s.tone, s.summary, s.rating, \
    s.rating_reason, s.facts, s.model, s.embedding, s.theme, s.status, s.error_message, s.user_rating, \
    s.user_feedback, s.is_public, s.deleted_at, s.created_at, s.updated_at";

fn summary_at(row: &Row, base: usize) -> rusqlite::Result<Summary> {
    Ok(Summary {
        id: row.get(base)?,
        owner_id: OwnerId::new(row.get::<_, String>(base + 1)?),
        article_id: row.get(base + 2)?,
        tone: parsed_column(row, base + 3)?,
        summary: row.get(base + 4)?,
        rating: row.get(base + 5)?,
        rating_reason: row.get(base + 6)?,
        facts: json_column(row, base + 7)?,
        model: row.get(base + 8)?,
        embedding: json_column(row, base + 9)?,
        theme: row.get(base + 10)?,
        status: parsed_column(row, base + 11)?,
        error_message: row.get(base + 12)?,
        user_rating: row.get(base + 13)?,
        user_feedback: row.get(base + 14)?,
        is_public: row.get::<_, i64>(base + 15)? != 0,
        deleted_at: opt_time_column(row, base + 16)?,
        created_at: time_column(row, base + 17)?,
        updated_at: time_column(row, base + 18)?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<Summary> {
    summary_at(row, 0)
}

fn titled_from_row(row: &Row) -> rusqlite::Result<TitledSummary> {
    Ok(TitledSummary {
        title: row.get(0)?,
        summary: summary_at(row, 1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::tests::bookmark;

    async fn setup() -> (Repository, OwnerId, i64) {
        let repo = Repository::in_memory().await.unwrap();
        let owner = OwnerId::new("alice");
        let (article_id, _) = repo.upsert_article(&owner, bookmark(1, "First")).await.unwrap();
        (repo, owner, article_id)
    }

    fn completion(text: &str) -> SummaryCompletion {
        SummaryCompletion {
            summary: text.to_string(),
            rating: 4,
            rating_reason: "solid".to_string(),
            facts: Facts {
                main_claim: "claim".to_string(),
                ..Facts::default()
            },
            model: "claude-sonnet-4-20250514".to_string(),
            embedding: vec![0.1, 0.2, 0.3],
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row() {
        let (repo, owner, article_id) = setup().await;

        let first = repo
            .upsert_summary_status(&owner, article_id, Tone::Snarky, SummaryStatus::Processing)
            .await
            .unwrap();
        repo.mark_summary_failed(&owner, &first, "boom").await.unwrap();
        let second = repo
            .upsert_summary_status(&owner, article_id, Tone::Snarky, SummaryStatus::Processing)
            .await
            .unwrap();

        assert_eq!(first, second);
        let all = repo.list_summaries(&owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SummaryStatus::Processing);
        assert!(all[0].error_message.is_none());
    }

    #[tokio::test]
    async fn test_different_tones_are_distinct_rows() {
        let (repo, owner, article_id) = setup().await;
        let neutral = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Pending)
            .await
            .unwrap();
        let casual = repo
            .upsert_summary_status(&owner, article_id, Tone::Casual, SummaryStatus::Pending)
            .await
            .unwrap();
        assert_ne!(neutral, casual);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_converge() {
        let (repo, owner, article_id) = setup().await;
        let attempts = (0..8).map(|_| {
            let repo = repo.clone();
            let owner = owner.clone();
            async move {
                repo.upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Processing)
                    .await
                    .unwrap()
            }
        });
        let ids = futures::future::join_all(attempts).await;
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(repo.list_summaries(&owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_brings_back_summaries() {
        let (repo, owner, article_id) = setup().await;
        let first = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Pending)
            .await
            .unwrap();
        repo.soft_delete_article(&owner, article_id).await.unwrap();
        repo.restore_article(&owner, article_id).await.unwrap();
        assert!(repo.get_summary(&owner, &first).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_summary_stores_embedding_and_facts() {
        let (repo, owner, article_id) = setup().await;
        let id = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Processing)
            .await
            .unwrap();
        repo.complete_summary(&owner, &id, completion("A summary")).await.unwrap();

        let summary = repo.get_summary(&owner, &id).await.unwrap().unwrap();
        assert_eq!(summary.status, SummaryStatus::Completed);
        assert_eq!(summary.rating, Some(4));
        assert_eq!(summary.embedding, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(summary.facts.unwrap().main_claim, "claim");
    }

    #[tokio::test]
    async fn test_set_status_on_other_owner_is_not_found() {
        let (repo, owner, article_id) = setup().await;
        let id = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Pending)
            .await
            .unwrap();
        let err = repo
            .set_summary_status(&OwnerId::new("mallory"), &id, SummaryStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recent_feedback_limited_per_tone() {
        let repo = Repository::in_memory().await.unwrap();
        let owner = OwnerId::new("alice");
        for i in 0..5 {
            let (article_id, _) = repo.upsert_article(&owner, bookmark(i, "Post")).await.unwrap();
            let id = repo
                .upsert_summary_status(&owner, article_id, Tone::Snarky, SummaryStatus::Pending)
                .await
                .unwrap();
            repo.submit_feedback(&owner, &id, Some(2), Some(format!("note {}", i)))
                .await
                .unwrap();
        }

        let feedback = repo.recent_feedback(&owner, Tone::Snarky, 3).await.unwrap();
        assert_eq!(feedback.len(), 3);
        assert!(repo.recent_feedback(&owner, Tone::Casual, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_rating_validated() {
        let (repo, owner, article_id) = setup().await;
        let id = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Pending)
            .await
            .unwrap();
        assert!(repo.submit_feedback(&owner, &id, Some(9), None).await.is_err());
    }

    #[tokio::test]
    async fn test_theme_queries() {
        let (repo, owner, article_id) = setup().await;
        let id = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Processing)
            .await
            .unwrap();
        repo.complete_summary(&owner, &id, completion("React hooks")).await.unwrap();

        let unlabeled = repo.theme_documents(&owner, true).await.unwrap();
        assert_eq!(unlabeled.len(), 1);
        assert!(unlabeled[0].text.contains("React hooks"));

        assert!(repo.set_theme(&owner, &id, "Frontend").await.unwrap());
        assert!(repo.theme_documents(&owner, true).await.unwrap().is_empty());
        assert_eq!(repo.existing_themes(&owner).await.unwrap(), vec!["Frontend"]);
        assert_eq!(
            repo.theme_sample_embeddings(&owner, "Frontend", 20).await.unwrap(),
            vec![vec![0.1, 0.2, 0.3]]
        );

        assert_eq!(repo.reset_themes(&owner).await.unwrap(), 1);
        assert!(repo.existing_themes(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_week_queries_follow_completion_time() {
        let (repo, owner, article_id) = setup().await;
        let id = repo
            .upsert_summary_status(&owner, article_id, Tone::Neutral, SummaryStatus::Processing)
            .await
            .unwrap();
        repo.complete_summary(&owner, &id, completion("first pass")).await.unwrap();

        // Pretend the row was created and completed ten days ago.
        let old = db_time(Utc::now() - chrono::Duration::days(10));
        let backdated = id.clone();
        repo.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE summaries SET created_at = ?1, completed_at = ?1 WHERE id = ?2",
                    params![old, backdated],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let now = Utc::now();
        let last_week = (now - chrono::Duration::days(11), now - chrono::Duration::days(9));
        let this_week = (now - chrono::Duration::days(1), now + chrono::Duration::days(1));
        let in_window = |rows: Vec<TitledSummary>| rows.into_iter().map(|r| r.summary.id).collect::<Vec<_>>();

        assert_eq!(
            in_window(repo.completed_summaries_between(&owner, last_week.0, last_week.1, 50).await.unwrap()),
            vec![id.clone()]
        );
        assert!(repo
            .completed_summaries_between(&owner, this_week.0, this_week.1, 50)
            .await
            .unwrap()
            .is_empty());

        // Regenerated today: it belongs to this week now, not the week the row was created.
        repo.set_summary_status(&owner, &id, SummaryStatus::Processing).await.unwrap();
        repo.complete_summary(&owner, &id, completion("second pass")).await.unwrap();

        assert_eq!(
            in_window(repo.completed_summaries_between(&owner, this_week.0, this_week.1, 50).await.unwrap()),
            vec![id.clone()]
        );
        assert!(repo
            .completed_summaries_between(&owner, last_week.0, last_week.1, 50)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.owners_with_completed_between(this_week.0, this_week.1).await.unwrap(),
            vec![owner.clone()]
        );
        assert!(repo
            .owners_with_completed_between(last_week.0, last_week.1)
            .await
            .unwrap()
            .is_empty());
    }

}
