use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use scaffold_sdk::migration::{LedgerKeyMode, MigrationRecord, MigrationStore, RecordOutcome};
use scaffold_sdk::model::{FieldSpec, SemanticType};
use scaffold_sdk::{AppError, Migration, MigrationGenerator, MigrationRegistry, Migrator, ModelDef, RollbackTarget};
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    mode: LedgerKeyMode,
    records: Vec<MigrationRecord>,
    tables: BTreeSet<String>,
    executed: Vec<String>,
    next_id: u64,
    /// Statements containing this text fail.
    fail_on: Option<String>,
    /// Pretend nothing is applied, as a second runner would before the first records.
    blind: bool,
}

/// Ledger and schema kept in memory; CREATE/DROP TABLE statements update the table set.
#[derive(Default)]
struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn failing_on(text: &str) -> Self {
        let store = MemoryStore::default();
        store.inner.lock().unwrap().fail_on = Some(text.to_string());
        store
    }

    fn blind() -> Self {
        let store = MemoryStore::default();
        store.inner.lock().unwrap().blind = true;
        store
    }

    fn tables(&self) -> BTreeSet<String> {
        self.inner.lock().unwrap().tables.clone()
    }

    fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    fn ledger(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| (r.version.clone(), r.name.clone()))
            .collect()
    }

    fn insert_record(&self, version: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(record(id, version, name));
    }
}

fn record(id: u64, version: &str, name: &str) -> MigrationRecord {
    let base: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    MigrationRecord {
        id,
        version: version.to_string(),
        name: name.to_string(),
        applied_at: base + chrono::Duration::seconds(id as i64),
    }
}

fn keyed(r: &MigrationRecord, version: &str, name: Option<&str>) -> bool {
    r.version == version && name.map_or(true, |n| r.name == n)
}

fn table_after<'a>(statement: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = statement.trim().strip_prefix(prefix)?;
    rest.split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|s| !s.is_empty())
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn ensure_ledger(&self, mode: LedgerKeyMode) -> Result<(), AppError> {
        self.inner.lock().unwrap().mode = mode;
        Ok(())
    }

    async fn is_applied(&self, version: &str, name: Option<&str>) -> Result<bool, AppError> {
        let inner = self.inner.lock().unwrap();
        if inner.blind {
            return Ok(false);
        }
        Ok(inner.records.iter().any(|r| keyed(r, version, name)))
    }

    async fn record(&self, version: &str, name: &str) -> Result<RecordOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let key_name = inner.mode.name_key(name);
        if inner.records.iter().any(|r| keyed(r, version, key_name)) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(record(id, version, name));
        Ok(RecordOutcome::Recorded)
    }

    async fn remove(&self, version: &str, name: Option<&str>) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.records.len();
        inner.records.retain(|r| !keyed(r, version, name));
        Ok((before - inner.records.len()) as u64)
    }

    async fn records(&self) -> Result<Vec<MigrationRecord>, AppError> {
        Ok(self.inner.lock().unwrap().records.clone())
    }

    async fn latest(&self) -> Result<Option<MigrationRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().max_by_key(|r| (r.applied_at, r.id)).cloned())
    }

    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(marker) = &inner.fail_on {
            if statement.contains(marker.as_str()) {
                return Err(sqlx::Error::Protocol(format!("rejected: {}", statement)));
            }
        }
        inner.executed.push(statement.to_string());
        if let Some(t) = table_after(statement, "CREATE TABLE IF NOT EXISTS ") {
            let t = t.to_string();
            inner.tables.insert(t);
        } else if let Some(t) = table_after(statement, "DROP TABLE IF EXISTS ") {
            let t = t.to_string();
            inner.tables.remove(&t);
        }
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AppError> {
        Ok(self.inner.lock().unwrap().tables.contains(table))
    }

    async fn drop_tables(&self, tables: &[String]) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        for t in tables {
            inner.tables.remove(t);
        }
        Ok(())
    }
}

fn create(version: &str, table: &str) -> Migration {
    Migration::new(
        version,
        format!("create_{}_table", table),
        format!("CREATE TABLE IF NOT EXISTS {} (id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, PRIMARY KEY (id));", table),
        format!("DROP TABLE IF EXISTS {};", table),
    )
}

fn registry(migrations: Vec<Migration>) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry.extend(migrations);
    registry
}

fn models() -> Vec<ModelDef> {
    vec![
        ModelDef::new("User")
            .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey;autoIncrement"))
            .field(FieldSpec::new("Email", SemanticType::String).tag("uniqueIndex;not null")),
        ModelDef::new("ActivityLog")
            .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey;autoIncrement"))
            .field(FieldSpec::new("Action", SemanticType::String).tag("size:64")),
    ]
}

#[tokio::test]
async fn applying_twice_runs_each_up_once() {
    let migrator = Migrator::new(
        MemoryStore::default(),
        registry(vec![create("20240102000000", "posts"), create("20240101000000", "users")]),
    );

    let first = migrator.apply_pending().await.unwrap();
    assert_eq!(
        first.iter().map(|m| m.version.as_str()).collect::<Vec<_>>(),
        vec!["20240101000000", "20240102000000"]
    );
    let second = migrator.apply_pending().await.unwrap();
    assert!(second.is_empty());

    assert_eq!(migrator.store().executed().len(), 2);
    assert_eq!(migrator.store().ledger().len(), 2);
    assert!(migrator.store().tables().contains("users"));
}

#[tokio::test]
async fn concurrent_record_is_not_an_error() {
    let migrator = Migrator::new(MemoryStore::blind(), registry(vec![create("20240101000000", "users")]));
    migrator.apply_pending().await.unwrap();
    // A runner that checked before the first recorded still succeeds, with one ledger row.
    migrator.apply_pending().await.unwrap();
    assert_eq!(migrator.store().ledger().len(), 1);
}

#[tokio::test]
async fn failed_statement_leaves_no_ledger_row() {
    let mut m = create("20240101000000", "users");
    m.up.push_str("\nCREATE INDEX broken ON users (nope);");
    let migrator = Migrator::new(MemoryStore::failing_on("broken"), registry(vec![m]));

    let err = migrator.apply_pending().await.unwrap_err();
    match err {
        AppError::Apply { version, statement, .. } => {
            assert_eq!(version, "20240101000000");
            assert!(statement.contains("broken"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(migrator.store().ledger().is_empty());
}

#[tokio::test]
async fn rollback_then_reapply_restores_schema() {
    let migrator = Migrator::new(
        MemoryStore::default(),
        registry(vec![create("20240101000000", "users"), create("20240102000000", "posts")]),
    );
    migrator.apply_pending().await.unwrap();
    let before = migrator.store().tables();

    let rolled = migrator.rollback(RollbackTarget::Latest).await.unwrap();
    assert_eq!(rolled.name, "create_posts_table");
    assert!(!migrator.store().tables().contains("posts"));
    assert_eq!(migrator.store().ledger().len(), 1);

    let reapplied = migrator.apply_pending().await.unwrap();
    assert_eq!(reapplied.len(), 1);
    assert_eq!(migrator.store().tables(), before);
}

#[tokio::test]
async fn rollback_by_version() {
    let migrator = Migrator::new(
        MemoryStore::default(),
        registry(vec![create("20240101000000", "users"), create("20240102000000", "posts")]),
    );
    migrator.apply_pending().await.unwrap();

    let rolled = migrator
        .rollback(RollbackTarget::Version("20240101000000".into()))
        .await
        .unwrap();
    assert_eq!(rolled.name, "create_users_table");
    assert_eq!(
        migrator.store().ledger(),
        vec![("20240102000000".to_string(), "create_posts_table".to_string())]
    );

    let again = migrator.rollback(RollbackTarget::Version("20240101000000".into())).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
    let unknown = migrator.rollback(RollbackTarget::Version("19990101000000".into())).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn rollback_with_empty_ledger_is_not_found() {
    let migrator = Migrator::new(MemoryStore::default(), MigrationRegistry::new());
    assert!(matches!(
        migrator.rollback(RollbackTarget::Latest).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn version_keyed_ledger_ignores_names() {
    let migrator = Migrator::new(MemoryStore::default(), registry(vec![create("20240101000000", "users")]))
        .with_key_mode(LedgerKeyMode::Version);
    migrator.store().insert_record("20240101000000", "renamed_elsewhere");
    assert!(migrator.apply_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_drops_and_reapplies() {
    let defs = models();
    let migrator = Migrator::new(
        MemoryStore::default(),
        registry(vec![create("20240101000000", "users"), create("20240101000000", "activity_logs")]),
    );
    migrator.apply_pending().await.unwrap();
    migrator.store().insert_record("20230101000000", "seed_roles");

    let applied = migrator.refresh(&defs).await.unwrap();
    assert_eq!(applied.len(), 2);
    let tables = migrator.store().tables();
    assert!(tables.contains("users") && tables.contains("activity_logs"));
    // Rows for other migrations survive.
    assert!(migrator
        .store()
        .ledger()
        .contains(&("20230101000000".to_string(), "seed_roles".to_string())));
}

#[tokio::test]
async fn run_all_generates_applies_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let generator = MigrationGenerator::new(dir.path());
    let defs = models();
    let mut migrator = Migrator::new(MemoryStore::default(), MigrationRegistry::new());

    let report = migrator.run_all(&defs, &generator).await.unwrap();
    assert_eq!(report.generation.generated.len(), 2);
    assert!(report.generation.is_ok());
    assert_eq!(report.applied_files.len(), 2);
    assert!(report.applied.is_empty());
    assert_eq!(migrator.store().ledger().len(), 2);
    assert!(migrator.store().tables().contains("users"));

    let again = migrator.run_all(&defs, &generator).await.unwrap();
    assert!(again.generation.generated.is_empty());
    assert!(again.applied_files.is_empty());
    assert!(again.applied.is_empty());
    assert_eq!(migrator.store().ledger().len(), 2);
}

#[tokio::test]
async fn fresh_reapplies_files_without_regenerating() {
    let dir = tempfile::tempdir().unwrap();
    let generator = MigrationGenerator::new(dir.path());
    let defs = models();
    let mut migrator = Migrator::new(MemoryStore::default(), MigrationRegistry::new());
    migrator.run_all(&defs, &generator).await.unwrap();

    let report = migrator.fresh(&defs, &generator).await.unwrap();
    assert!(report.generation.generated.is_empty());
    assert_eq!(report.generation.skipped.len(), 2);
    assert_eq!(report.applied_files.len(), 2);
    assert_eq!(migrator.store().ledger().len(), 2);
    assert!(migrator.store().tables().contains("activity_logs"));
}

#[tokio::test]
async fn files_from_a_previous_process_can_be_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let generator = MigrationGenerator::new(dir.path());
    let mut first = Migrator::new(MemoryStore::default(), MigrationRegistry::new());
    first.run_all(&models(), &generator).await.unwrap();

    let mut registry = MigrationRegistry::new();
    assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
    let store = MemoryStore::default();
    for m in registry.all() {
        store.insert_record(&m.version, &m.name);
    }
    let second = Migrator::new(store, registry);
    let rolled = second.rollback(RollbackTarget::Latest).await.unwrap();
    assert!(rolled.down.starts_with("DROP TABLE IF EXISTS"));
    assert_eq!(second.store().ledger().len(), 1);
}

#[tokio::test]
async fn status_reports_pending_applied_and_unregistered() {
    let migrator = Migrator::new(
        MemoryStore::default(),
        registry(vec![create("20240101000000", "users"), create("20240102000000", "posts")]),
    );
    migrator.store().insert_record("20240101000000", "create_users_table");
    migrator.store().insert_record("20230101000000", "legacy");

    let status = migrator.status().await.unwrap();
    let summary: Vec<(&str, bool, bool)> = status
        .iter()
        .map(|s| (s.name.as_str(), s.applied, s.registered))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("legacy", true, false),
            ("create_users_table", true, true),
            ("create_posts_table", false, true),
        ]
    );
}

#[tokio::test]
async fn version_keyed_run_all_creates_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let generator = MigrationGenerator::new(dir.path());
    let mut migrator =
        Migrator::new(MemoryStore::default(), MigrationRegistry::new()).with_key_mode(LedgerKeyMode::Version);

    let report = migrator.run_all(&models(), &generator).await.unwrap();
    assert_eq!(report.applied_files.len(), 2);
    let tables = migrator.store().tables();
    assert!(tables.contains("users") && tables.contains("activity_logs"));
    let versions: BTreeSet<String> = migrator.store().ledger().into_iter().map(|(v, _)| v).collect();
    assert_eq!(versions.len(), 2);
}
