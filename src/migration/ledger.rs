//! Ledger of applied migrations and the storage seam the runner talks to.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

/// How ledger rows are keyed. `VersionName` disambiguates migrations generated in the same second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LedgerKeyMode {
    Version,
    #[default]
    VersionName,
}

impl LedgerKeyMode {
    /// Name component used for lookups under this mode.
    pub fn name_key<'a>(&self, name: &'a str) -> Option<&'a str> {
        match self {
            LedgerKeyMode::Version => None,
            LedgerKeyMode::VersionName => Some(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub id: u64,
    pub version: String,
    pub name: String,
    pub applied_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The unique key already held this migration; another runner got there first.
    AlreadyRecorded,
}

/// Persistent side of the runner: the ledger table plus raw statement execution.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create the ledger table if absent, unique on `(version)` or `(version, name)`.
    async fn ensure_ledger(&self, mode: LedgerKeyMode) -> Result<(), AppError>;

    /// `name: None` checks by version alone.
    async fn is_applied(&self, version: &str, name: Option<&str>) -> Result<bool, AppError>;

    /// Insert a ledger row. A unique-key violation is `AlreadyRecorded`, not an error.
    async fn record(&self, version: &str, name: &str) -> Result<RecordOutcome, AppError>;

    /// Delete ledger rows; returns how many were removed.
    async fn remove(&self, version: &str, name: Option<&str>) -> Result<u64, AppError>;

    /// All rows, oldest first.
    async fn records(&self) -> Result<Vec<MigrationRecord>, AppError>;

    /// Most recently applied row (by `applied_at`, then id).
    async fn latest(&self) -> Result<Option<MigrationRecord>, AppError>;

    /// Run one SQL statement.
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error>;

    async fn table_exists(&self, table: &str) -> Result<bool, AppError>;

    /// Drop tables with foreign key checks disabled for the duration.
    async fn drop_tables(&self, tables: &[String]) -> Result<(), AppError>;
}
