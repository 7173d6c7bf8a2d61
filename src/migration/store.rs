//! MySQL-backed migration ledger.

use crate::error::{is_unique_violation, AppError};
use crate::migration::ledger::{LedgerKeyMode, MigrationRecord, MigrationStore, RecordOutcome, DEFAULT_LEDGER_TABLE};
use crate::sql::ddl::TABLE_OPTIONS;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Executor, MySqlPool, Row};

fn quoted(s: &str) -> String {
    format!("`{}`", s.replace('`', "``"))
}

pub struct MySqlStore {
    pool: MySqlPool,
    table: String,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlStore {
            pool,
            table: DEFAULT_LEDGER_TABLE.into(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn key_clause(name: Option<&str>) -> &'static str {
        if name.is_some() {
            "version = ? AND name = ?"
        } else {
            "version = ?"
        }
    }
}

/// Ledger table DDL. The unique key name is derived from the table name with anything but
/// ASCII alphanumerics and `_` replaced.
fn ledger_ddl(table: &str, mode: LedgerKeyMode) -> String {
    let key = match mode {
        LedgerKeyMode::Version => "version",
        LedgerKeyMode::VersionName => "version, name",
    };
    let index: String = table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n  \
         id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,\n  \
         version VARCHAR(64) NOT NULL,\n  \
         name VARCHAR(255) NOT NULL,\n  \
         applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,\n  \
         PRIMARY KEY (id),\n  \
         UNIQUE KEY {index} ({key})\n\
         ) {options}",
        table = quoted(table),
        index = quoted(&format!("uidx_{}_key", index)),
        key = key,
        options = TABLE_OPTIONS
    )
}

fn record_from_row(row: &MySqlRow) -> Result<MigrationRecord, sqlx::Error> {
    Ok(MigrationRecord {
        id: row.try_get::<u64, _>("id")?,
        version: row.try_get("version")?,
        name: row.try_get("name")?,
        applied_at: row.try_get::<NaiveDateTime, _>("applied_at")?,
    })
}

#[async_trait]
impl MigrationStore for MySqlStore {
    async fn ensure_ledger(&self, mode: LedgerKeyMode) -> Result<(), AppError> {
        sqlx::raw_sql(&ledger_ddl(&self.table, mode)).execute(&self.pool).await?;
        Ok(())
    }

    async fn is_applied(&self, version: &str, name: Option<&str>) -> Result<bool, AppError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quoted(&self.table),
            Self::key_clause(name)
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(version);
        if let Some(name) = name {
            query = query.bind(name);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn record(&self, version: &str, name: &str) -> Result<RecordOutcome, AppError> {
        let sql = format!(
            "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
            quoted(&self.table)
        );
        let result = sqlx::query(&sql)
            .bind(version)
            .bind(name)
            .bind(chrono::Utc::now().naive_utc())
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(RecordOutcome::Recorded),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(version, name, "ledger row already present");
                Ok(RecordOutcome::AlreadyRecorded)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, version: &str, name: Option<&str>) -> Result<u64, AppError> {
        let sql = format!("DELETE FROM {} WHERE {}", quoted(&self.table), Self::key_clause(name));
        let mut query = sqlx::query(&sql).bind(version);
        if let Some(name) = name {
            query = query.bind(name);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn records(&self) -> Result<Vec<MigrationRecord>, AppError> {
        let sql = format!(
            "SELECT id, version, name, applied_at FROM {} ORDER BY applied_at, id",
            quoted(&self.table)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(record_from_row).collect::<Result<_, _>>()?)
    }

    async fn latest(&self) -> Result<Option<MigrationRecord>, AppError> {
        let sql = format!(
            "SELECT id, version, name, applied_at FROM {} ORDER BY applied_at DESC, id DESC LIMIT 1",
            quoted(&self.table)
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        tracing::debug!(sql = %statement, "execute");
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn drop_tables(&self, tables: &[String]) -> Result<(), AppError> {
        // session setting: every statement must run on the same connection
        let mut pooled = self.pool.acquire().await?;
        let conn: &mut MySqlConnection = &mut pooled;
        conn.execute(sqlx::raw_sql("SET FOREIGN_KEY_CHECKS = 0")).await?;
        let mut result = Ok(());
        for table in tables {
            tracing::info!(table = %table, "dropping table");
            let sql = format!("DROP TABLE IF EXISTS {}", quoted(table));
            if let Err(e) = conn.execute(sqlx::raw_sql(&sql)).await {
                result = Err(e.into());
                break;
            }
        }
        conn.execute(sqlx::raw_sql("SET FOREIGN_KEY_CHECKS = 1")).await?;
        result
    }
}
