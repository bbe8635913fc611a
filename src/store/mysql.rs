//! MySQL-backed persistent store using sqlx.
//!
//! Schema: one row per key with a monotonic version column. The version
//! increment in `put` runs as `SELECT ... FOR UPDATE` plus upsert inside a
//! single transaction, so concurrent writers to the same key are serialized
//! by the row lock and receive strictly increasing versions.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::{Config, StoreConfig};
use crate::error::{Error, Result};
use crate::record::Record;

use super::{with_retry, PersistentStore};

/// Relational source of truth.
pub struct MySqlStore {
    pool: MySqlPool,
    table: String,
    policy: StoreConfig,
}

impl MySqlStore {
    /// Connect to MySQL and ensure the records table exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let table = validated_table(&config.table)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.store.max_connections)
            .acquire_timeout(config.store.op_timeout)
            .connect(&config.mysql_url)
            .await?;

        let store = Self {
            pool,
            table,
            policy: config.store.clone(),
        };
        store.ensure_schema().await?;

        info!(table = %store.table, "MySQL store connected");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        // VARCHAR(191): longest key indexable under utf8mb4.
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                record_key VARCHAR(191) NOT NULL PRIMARY KEY,
                version BIGINT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TIMESTAMP(3) NOT NULL
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.policy.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transient(format!(
                "store operation exceeded {:?}",
                self.policy.op_timeout
            ))),
        }
    }

    async fn get_once(&self, key: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT version, payload, updated_at FROM {} WHERE record_key = ?",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let version: i64 = row.try_get("version")?;
                let payload: String = row.try_get("payload")?;
                let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
                Ok(Some(Record {
                    key: key.to_string(),
                    version: version as u64,
                    payload: serde_json::from_str(&payload)?,
                    updated_at,
                }))
            }
        }
    }

    async fn put_once(&self, key: &str, payload: &Value) -> Result<Record> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT version FROM {} WHERE record_key = ? FOR UPDATE",
            self.table
        );
        let current: Option<i64> = sqlx::query_scalar(&select)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
        let next = current.unwrap_or(0) + 1;

        let now = Utc::now();
        let upsert = format!(
            "INSERT INTO {} (record_key, version, payload, updated_at)
             VALUES (?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                version = VALUES(version),
                payload = VALUES(payload),
                updated_at = VALUES(updated_at)",
            self.table
        );
        sqlx::query(&upsert)
            .bind(key)
            .bind(next)
            .bind(serde_json::to_string(payload)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(key, version = next, "store put");

        Ok(Record {
            key: key.to_string(),
            version: next as u64,
            payload: payload.clone(),
            updated_at: now,
        })
    }

    async fn delete_once(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE record_key = ?", self.table);
        let result = sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl PersistentStore for MySqlStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        with_retry("get", self.policy.max_retries, self.policy.retry_base, || {
            self.bounded(self.get_once(key))
        })
        .await
    }

    async fn put(&self, key: &str, payload: Value) -> Result<Record> {
        with_retry("put", self.policy.max_retries, self.policy.retry_base, || {
            self.bounded(self.put_once(key, &payload))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        with_retry(
            "delete",
            self.policy.max_retries,
            self.policy.retry_base,
            || self.bounded(self.delete_once(key)),
        )
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Reject table names that would break out of the identifier position.
/// Identifiers cannot be bound as parameters, so this is the safety line.
fn validated_table(name: &str) -> Result<String> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(name.to_string())
    } else {
        Err(Error::InvalidConfig(format!(
            "invalid table name: {name:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_validated() {
        assert!(validated_table("fleetsync_records").is_ok());
        assert!(validated_table("Records2").is_ok());
        assert!(validated_table("").is_err());
        assert!(validated_table("records; DROP TABLE x").is_err());
        assert!(validated_table("records`").is_err());
    }
}
