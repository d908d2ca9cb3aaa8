use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::ledger::Usd;
use crate::models::{Article, NewArticle, OwnerId, Tone, UserSettings};

use super::schema::SCHEMA;

/// Owner-scoped access to the SQLite store.
///
/// Every method touching user data takes the owner and filters on it; there
/// is no ambient "current user".
#[derive(Clone)]
pub struct Repository {
    pub(super) conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn upsert_user(&self, owner: &OwnerId, settings: UserSettings) -> Result<()> {
        let owner = owner.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO users (owner_id, claude_api_key, openai_api_key, raindrop_token,
                                          monthly_budget_usd, default_tone, utc_offset_minutes)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(owner_id) DO UPDATE SET
                           claude_api_key = excluded.claude_api_key,
                           openai_api_key = excluded.openai_api_key,
                           raindrop_token = excluded.raindrop_token,
                           monthly_budget_usd = excluded.monthly_budget_usd,
                           default_tone = excluded.default_tone,
                           utc_offset_minutes = excluded.utc_offset_minutes"#,
                    params![
                        owner,
                        settings.claude_api_key,
                        settings.openai_api_key,
                        settings.raindrop_token,
                        settings.monthly_budget.map(|b| b.to_string()),
                        settings.default_tone.as_str(),
                        settings.utc_offset_minutes,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Settings for the owner, or defaults when the owner has never saved any.
    pub async fn get_user_settings(&self, owner: &OwnerId) -> Result<UserSettings> {
        let key = owner.to_string();
        let settings = self
            .conn
            .call(move |conn| {
                let settings = conn
                    .query_row(
                        r#"SELECT owner_id, claude_api_key, openai_api_key, raindrop_token,
                                  monthly_budget_usd, default_tone, utc_offset_minutes
                           FROM users WHERE owner_id = ?1"#,
                        params![key],
                        user_from_row,
                    )
                    .optional()?;
                Ok(settings)
            })
            .await?;
        Ok(settings.unwrap_or_default())
    }

    // Article operations

    /// Insert or refresh a bookmark keyed by (owner, remote id).
    ///
    /// Returns the article id and whether the row is new. Extracted body text
    /// and the soft-delete marker survive re-imports.
    pub async fn upsert_article(&self, owner: &OwnerId, article: NewArticle) -> Result<(i64, bool)> {
        let owner = owner.to_string();
        let tags = serde_json::to_string(&article.tags)?;
        let now = db_time(Utc::now());
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM articles WHERE owner_id = ?1 AND remote_id = ?2",
                        params![owner, article.remote_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let id = match existing {
                    Some(id) => {
                        tx.execute(
                            r#"UPDATE articles SET
                                   title = ?1, url = ?2, excerpt = COALESCE(excerpt, ?3),
                                   cover_url = ?4, tags = ?5, collection_id = ?6,
                                   remote_created_at = ?7, synced_at = ?8
                               WHERE id = ?9 AND owner_id = ?10"#,
                            params![
                                article.title,
                                article.url,
                                article.excerpt,
                                article.cover_url,
                                tags,
                                article.collection_id,
                                article.remote_created_at.map(db_time),
                                now,
                                id,
                                owner,
                            ],
                        )?;
                        id
                    }
                    None => {
                        tx.execute(
                            r#"INSERT INTO articles (owner_id, remote_id, title, url, excerpt, cover_url,
                                                     tags, collection_id, remote_created_at, synced_at)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                            params![
                                owner,
                                article.remote_id,
                                article.title,
                                article.url,
                                article.excerpt,
                                article.cover_url,
                                tags,
                                article.collection_id,
                                article.remote_created_at.map(db_time),
                                now,
                            ],
                        )?;
                        tx.last_insert_rowid()
                    }
                };
                tx.commit()?;
                Ok((id, existing.is_none()))
            })
            .await?;
        Ok(result)
    }

    /// A live (not soft-deleted) article.
    pub async fn get_article(&self, owner: &OwnerId, id: i64) -> Result<Option<Article>> {
        let owner = owner.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM articles WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
                            ARTICLE_COLUMNS
                        ),
                        params![id, owner],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn list_articles(&self, owner: &OwnerId) -> Result<Vec<Article>> {
        let owner = owner.to_string();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM articles
                       WHERE owner_id = ?1 AND deleted_at IS NULL
                       ORDER BY remote_created_at DESC NULLS LAST, id DESC"#,
                    ARTICLE_COLUMNS
                ))?;
                let articles = stmt
                    .query_map(params![owner], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Overwrite the stored excerpt with the full extracted body.
    pub async fn update_article_text(&self, owner: &OwnerId, id: i64, text: String) -> Result<bool> {
        let owner = owner.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE articles SET excerpt = ?1 WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
                    params![text, id, owner],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(updated)
    }

    /// Most recent live articles that have never had a summary row.
    pub async fn articles_without_summary(&self, owner: &OwnerId, limit: usize) -> Result<Vec<Article>> {
        let owner = owner.to_string();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM articles a
                       WHERE a.owner_id = ?1 AND a.deleted_at IS NULL
                         AND NOT EXISTS (
                             SELECT 1 FROM summaries s
                             WHERE s.article_id = a.id AND s.owner_id = a.owner_id
                         )
                       ORDER BY a.remote_created_at DESC NULLS LAST, a.id DESC
                       LIMIT ?2"#,
                    ARTICLE_COLUMNS_A
                ))?;
                let articles = stmt
                    .query_map(params![owner, limit as i64], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn soft_delete_article(&self, owner: &OwnerId, id: i64) -> Result<bool> {
        let owner = owner.to_string();
        let now = db_time(Utc::now());
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let n = tx.execute(
                    "UPDATE articles SET deleted_at = ?1 WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
                    params![now, id, owner],
                )?;
                tx.execute(
                    "UPDATE summaries SET deleted_at = ?1 WHERE article_id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
                    params![now, id, owner],
                )?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Undo a soft delete. Summaries deleted together with the article come back
    /// unless a newer summary for the same tone has taken their slot.
    pub async fn restore_article(&self, owner: &OwnerId, id: i64) -> Result<bool> {
        let owner = owner.to_string();
        let restored = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let deleted_at: Option<String> = tx
                    .query_row(
                        "SELECT deleted_at FROM articles WHERE id = ?1 AND owner_id = ?2",
                        params![id, owner],
                        |row| row.get(0),
                    )
                    .optional()?
                    .flatten();
                let Some(deleted_at) = deleted_at else {
                    return Ok(false);
                };
                tx.execute(
                    "UPDATE articles SET deleted_at = NULL WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner],
                )?;
                tx.execute(
                    r#"UPDATE summaries SET deleted_at = NULL
                       WHERE article_id = ?1 AND owner_id = ?2 AND deleted_at = ?3
                         AND NOT EXISTS (
                             SELECT 1 FROM summaries live
                             WHERE live.owner_id = summaries.owner_id
                               AND live.article_id = summaries.article_id
                               AND live.tone = summaries.tone
                               AND live.deleted_at IS NULL
                         )"#,
                    params![id, owner, deleted_at],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(restored)
    }

    /// Hard-delete articles soft-deleted before `cutoff`. Their summaries cascade.
    pub async fn purge_deleted_articles(&self, owner: &OwnerId, cutoff: DateTime<Utc>) -> Result<usize> {
        let owner = owner.to_string();
        let cutoff = db_time(cutoff);
        let purged = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM articles WHERE owner_id = ?1 AND deleted_at IS NOT NULL AND deleted_at < ?2",
                    params![owner, cutoff],
                )?;
                Ok(n)
            })
            .await?;
        Ok(purged)
    }
}

const ARTICLE_COLUMNS: &str = "id, owner_id, remote_id, title, url, excerpt, cover_url, tags, \
    collection_id, remote_created_at, synced_at, deleted_at";

const ARTICLE_COLUMNS_A: &str = "a.id, a.owner_id, a.remote_id, a.title, a.url, a.excerpt, a.cover_url, \
    a.tags, a.collection_id, a.remote_created_at, a.synced_at, a.deleted_at";

/// Timestamps are stored as fixed-width UTC RFC 3339 so they compare lexically.
pub(crate) fn db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

pub(crate) fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_datetime(&raw).unwrap_or_else(Utc::now))
}

pub(crate) fn opt_time_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s)))
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

pub(crate) fn parsed_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserSettings> {
    let budget: Option<String> = row.get(4)?;
    Ok(UserSettings {
        owner_id: Some(OwnerId::new(row.get::<_, String>(0)?)),
        claude_api_key: row.get(1)?,
        openai_api_key: row.get(2)?,
        raindrop_token: row.get(3)?,
        monthly_budget: budget.and_then(|b| b.parse::<Usd>().ok()),
        default_tone: parsed_column::<Tone>(row, 5)?,
        utc_offset_minutes: row.get(6)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        remote_id: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        excerpt: row.get(5)?,
        cover_url: row.get(6)?,
        tags: json_column(row, 7)?.unwrap_or_default(),
        collection_id: row.get(8)?,
        remote_created_at: opt_time_column(row, 9)?,
        synced_at: time_column(row, 10)?,
        deleted_at: opt_time_column(row, 11)?,
    })
}
