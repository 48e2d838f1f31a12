use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::{Direction, DocumentStore, SortField, StoreError};
use crate::catalog::{Collection, ContentRecord};

/// Document store backed by a single SQLite table.
///
/// Each row keeps the ordering columns (`title`, `date`) alongside the full
/// record as JSON in `fields`, so new record fields need no migration.
/// Ids are 20 hex chars from `randomblob`, assigned by SQLite on insert.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the database,
    /// [`StoreError::Migration`] if the schema could not be created.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";

        // SEC-010: pre-create the file owner-only so it never exists with
        // umask permissions.
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(db_path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
                // If creation fails, SQLite reports the error at connect time.
                let _ = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path);
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path);
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // In-memory databases live per connection; keep a single one.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(|e| match StoreError::from_sqlx(e) {
            StoreError::Locked => StoreError::Locked,
            other => StoreError::Migration(other.to_string()),
        })?;
        Ok(store)
    }

    /// Creates the schema inside one transaction. Idempotent.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(10)))),
                collection TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                date INTEGER NOT NULL DEFAULT 0,
                fields TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_collection_date ON records(collection, date DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Row count across all collections.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count)
    }
}

/// Fixed query text per ordering; the sort never comes from user input.
fn select_sql(order_by: SortField, direction: Direction) -> &'static str {
    match (order_by, direction) {
        (SortField::Date, Direction::Descending) => {
            "SELECT id, fields FROM records WHERE collection = ? ORDER BY date DESC, rowid DESC"
        }
        (SortField::Date, Direction::Ascending) => {
            "SELECT id, fields FROM records WHERE collection = ? ORDER BY date ASC, rowid ASC"
        }
        (SortField::Title, Direction::Descending) => {
            "SELECT id, fields FROM records WHERE collection = ? ORDER BY title DESC, rowid DESC"
        }
        (SortField::Title, Direction::Ascending) => {
            "SELECT id, fields FROM records WHERE collection = ? ORDER BY title ASC, rowid ASC"
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query(
        &self,
        collection: Collection,
        order_by: SortField,
        direction: Direction,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(select_sql(order_by, direction))
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, fields) in rows {
            match serde_json::from_str::<ContentRecord>(&fields) {
                Ok(mut record) => {
                    record.id = Some(id);
                    records.push(record);
                }
                // One corrupt row must not hide the rest of the collection.
                Err(e) => {
                    tracing::warn!(collection = %collection, id = %id, error = %e, "Skipping record with malformed fields");
                }
            }
        }
        Ok(records)
    }

    async fn insert(
        &self,
        collection: Collection,
        record: &ContentRecord,
    ) -> Result<String, StoreError> {
        let mut stored = record.clone();
        stored.id = None;
        let fields = serde_json::to_string(&stored)?;

        let id: String = sqlx::query_scalar(
            "INSERT INTO records (collection, title, date, fields) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(collection.as_str())
        .bind(&stored.title)
        .bind(stored.date)
        .bind(fields)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(id)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}
