use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::Result;
use crate::ledger::Usd;
use crate::models::{NewUsageRecord, OwnerId, Provider, UsageRecord};

use super::repository::{db_time, parsed_column, time_column};
use super::Repository;

impl Repository {
    /// Append one ledger row. Usage rows are never updated or deleted.
    pub async fn insert_usage(&self, record: NewUsageRecord) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO usage_records (owner_id, summary_id, provider, model,
                                                  input_tokens, output_tokens, cost_usd, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        record.owner_id.as_str(),
                        record.summary_id,
                        record.provider.as_str(),
                        record.model,
                        record.input_tokens as i64,
                        record.output_tokens as i64,
                        record.cost.to_string(),
                        db_time(record.created_at),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Usage rows with `from <= created_at <= to`, oldest first.
    pub async fn usage_between(
        &self,
        owner: &OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        let owner = owner.to_string();
        let (from, to) = (db_time(from), db_time(to));
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, owner_id, summary_id, provider, model, input_tokens, output_tokens,
                              cost_usd, created_at
                       FROM usage_records
                       WHERE owner_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                       ORDER BY created_at, id"#,
                )?;
                let records = stmt
                    .query_map(params![owner, from, to], |row| {
                        Ok(UsageRecord {
                            id: row.get(0)?,
                            owner_id: OwnerId::new(row.get::<_, String>(1)?),
                            summary_id: row.get(2)?,
                            provider: parsed_column::<Provider>(row, 3)?,
                            model: row.get(4)?,
                            input_tokens: row.get::<_, i64>(5)? as u64,
                            output_tokens: row.get::<_, i64>(6)? as u64,
                            cost: parsed_column::<Usd>(row, 7)?,
                            created_at: time_column(row, 8)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await?;
        Ok(records)
    }
}
