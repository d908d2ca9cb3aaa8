use chrono::Utc;
use rusqlite::params;

use crate::error::Result;
use crate::models::{Notification, OwnerId};

use super::repository::{db_time, json_column, time_column};
use super::Repository;

impl Repository {
    pub async fn insert_notification(
        &self,
        owner: &OwnerId,
        event: &str,
        data: &serde_json::Value,
    ) -> Result<i64> {
        let owner = owner.to_string();
        let event = event.to_string();
        let data = serde_json::to_string(data)?;
        let now = db_time(Utc::now());
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO notifications (owner_id, event, data, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![owner, event, data, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn unread_notifications(&self, owner: &OwnerId) -> Result<Vec<Notification>> {
        let owner = owner.to_string();
        let notifications = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, owner_id, event, data, is_read, created_at FROM notifications
                       WHERE owner_id = ?1 AND is_read = 0
                       ORDER BY id"#,
                )?;
                let notifications = stmt
                    .query_map(params![owner], |row| {
                        Ok(Notification {
                            id: row.get(0)?,
                            owner_id: OwnerId::new(row.get::<_, String>(1)?),
                            event: row.get(2)?,
                            data: json_column(row, 3)?.unwrap_or_default(),
                            is_read: row.get::<_, i64>(4)? != 0,
                            created_at: time_column(row, 5)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(notifications)
            })
            .await?;
        Ok(notifications)
    }

    pub async fn mark_notifications_read(&self, owner: &OwnerId) -> Result<usize> {
        let owner = owner.to_string();
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE owner_id = ?1 AND is_read = 0",
                    params![owner],
                )?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_owner() {
        let repo = Repository::in_memory().await.unwrap();
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        repo.insert_notification(&alice, "import:completed", &serde_json::json!({"new": 2}))
            .await
            .unwrap();
        repo.insert_notification(&bob, "import:completed", &serde_json::json!({"new": 1}))
            .await
            .unwrap();

        assert_eq!(repo.mark_notifications_read(&alice).await.unwrap(), 1);
        assert!(repo.unread_notifications(&alice).await.unwrap().is_empty());

        let bobs = repo.unread_notifications(&bob).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].data["new"], 1);
    }
}
