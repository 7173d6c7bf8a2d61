//! Applies registered and on-disk migrations against a [`MigrationStore`], and rolls them back.

use crate::error::AppError;
use crate::migration::artifact;
use crate::migration::generator::{migration_name, GenerationReport, MigrationGenerator};
use crate::migration::ledger::{LedgerKeyMode, MigrationRecord, MigrationStore, RecordOutcome};
use crate::migration::registry::{Migration, MigrationRegistry};
use crate::model::ModelDef;
use crate::sql::ddl::split_statements;
use serde::Serialize;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The most recently applied ledger row.
    Latest,
    Version(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub applied: bool,
    /// False for ledger rows with no registered migration.
    pub registered: bool,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub generation: GenerationReport,
    /// File names of SQL artifacts applied from the migrations directory.
    pub applied_files: Vec<String>,
    /// Registered migrations applied after the directory scan.
    pub applied: Vec<Migration>,
}

pub struct Migrator<S> {
    store: S,
    registry: MigrationRegistry,
    key_mode: LedgerKeyMode,
}

impl<S: MigrationStore> Migrator<S> {
    pub fn new(store: S, registry: MigrationRegistry) -> Self {
        Migrator {
            store,
            registry,
            key_mode: LedgerKeyMode::default(),
        }
    }

    pub fn with_key_mode(mut self, mode: LedgerKeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MigrationRegistry {
        &mut self.registry
    }

    async fn is_applied(&self, m: &Migration) -> Result<bool, AppError> {
        self.store.is_applied(&m.version, self.key_mode.name_key(&m.name)).await
    }

    async fn run_statements(&self, m: &Migration, sql: &str) -> Result<(), AppError> {
        for statement in split_statements(sql) {
            self.store
                .execute(&statement)
                .await
                .map_err(|source| AppError::Apply {
                    version: m.version.clone(),
                    name: m.name.clone(),
                    statement: statement.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Execute `up` then record. The ledger row is written only after every statement succeeded.
    async fn apply_one(&self, m: &Migration) -> Result<(), AppError> {
        tracing::info!(version = %m.version, name = %m.name, "applying migration");
        self.run_statements(m, &m.up).await?;
        if self.store.record(&m.version, &m.name).await? == RecordOutcome::AlreadyRecorded {
            tracing::debug!(version = %m.version, name = %m.name, "migration recorded concurrently");
        }
        Ok(())
    }

    /// Apply every registered migration missing from the ledger, in version order.
    /// Safe to call repeatedly.
    pub async fn apply_pending(&self) -> Result<Vec<Migration>, AppError> {
        self.store.ensure_ledger(self.key_mode).await?;
        let mut applied = Vec::new();
        for m in self.registry.all() {
            if self.is_applied(m).await? {
                continue;
            }
            self.apply_one(m).await?;
            applied.push(m.clone());
        }
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "applied registered migrations");
        }
        Ok(applied)
    }

    /// Apply unapplied `.up.sql` files from `dir` in filename order. Each applied file is also
    /// registered so it can be rolled back in this process. Returns applied file names.
    pub async fn apply_from_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>, AppError> {
        let dir = dir.as_ref();
        self.store.ensure_ledger(self.key_mode).await?;
        let files = artifact::discover_sql(dir)?;
        if files.is_empty() {
            tracing::info!(dir = %dir.display(), "no .up.sql files found");
        }
        let mut applied = Vec::new();
        for file in files {
            let m = file.read()?;
            if self.is_applied(&m).await? {
                tracing::debug!(file = %file.file_name, "skipping already-applied migration file");
                self.registry.register(m);
                continue;
            }
            if m.up.trim().is_empty() {
                tracing::warn!(file = %file.file_name, "empty sql file, recording without execution");
            }
            self.apply_one(&m).await?;
            applied.push(file.file_name);
            self.registry.register(m);
        }
        Ok(applied)
    }

    /// Run the target's `down` and delete its ledger row.
    pub async fn rollback(&self, target: RollbackTarget) -> Result<Migration, AppError> {
        self.store.ensure_ledger(self.key_mode).await?;
        let migration = match target {
            RollbackTarget::Latest => {
                let record = self
                    .store
                    .latest()
                    .await?
                    .ok_or_else(|| AppError::NotFound("no applied migrations".into()))?;
                self.registered_for(&record)
                    .ok_or_else(|| AppError::NotFound(format!("migration {} ({}) is not registered", record.version, record.name)))?
            }
            RollbackTarget::Version(version) => {
                let candidates: Vec<&Migration> = self.registry.all().into_iter().filter(|m| m.version == version).collect();
                if candidates.is_empty() {
                    return Err(AppError::NotFound(format!("migration {} is not registered", version)));
                }
                let mut found = None;
                for m in candidates {
                    if self.is_applied(m).await? {
                        found = Some(m);
                        break;
                    }
                }
                found.ok_or_else(|| AppError::NotFound(format!("migration {} is not applied", version)))?
            }
        };

        tracing::info!(version = %migration.version, name = %migration.name, "rolling back migration");
        self.run_statements(migration, &migration.down).await?;
        self.store
            .remove(&migration.version, self.key_mode.name_key(&migration.name))
            .await?;
        Ok(migration.clone())
    }

    fn registered_for(&self, record: &MigrationRecord) -> Option<&Migration> {
        self.registry
            .get(&record.version, &record.name)
            .or_else(|| match self.key_mode {
                LedgerKeyMode::Version => self.registry.by_version(&record.version),
                LedgerKeyMode::VersionName => None,
            })
    }

    /// Drop every model's table and forget its `create_<table>_table` ledger rows.
    pub async fn drop_all(&self, models: &[ModelDef]) -> Result<(), AppError> {
        let tables: Vec<String> = models.iter().map(ModelDef::table_name).collect();
        tracing::info!(count = tables.len(), "dropping all tables");
        self.store.drop_tables(&tables).await?;

        self.store.ensure_ledger(self.key_mode).await?;
        let names: Vec<String> = tables.iter().map(|t| migration_name(t)).collect();
        for record in self.store.records().await? {
            if names.contains(&record.name) {
                self.store
                    .remove(&record.version, self.key_mode.name_key(&record.name))
                    .await?;
            }
        }
        Ok(())
    }

    /// Drop all, then re-apply every registered migration.
    pub async fn refresh(&self, models: &[ModelDef]) -> Result<Vec<Migration>, AppError> {
        self.drop_all(models).await?;
        self.apply_pending().await
    }

    /// Generate migrations for models whose table is missing, apply SQL files from the
    /// generator's directory, then apply everything registered.
    pub async fn run_all(&mut self, models: &[ModelDef], generator: &MigrationGenerator) -> Result<RunReport, AppError> {
        let mut missing = Vec::new();
        for def in models {
            if self.store.table_exists(&def.table_name()).await? {
                continue;
            }
            missing.push(def.clone());
        }
        let generation = generator.generate(&missing, &mut self.registry)?;
        for (model, err) in &generation.failed {
            tracing::error!(model = %model, error = %err, "skipping model with generation failure");
        }
        let applied_files = self.apply_from_dir(generator.dir()).await?;
        let applied = self.apply_pending().await?;
        Ok(RunReport {
            generation,
            applied_files,
            applied,
        })
    }

    /// Drop all, then run all.
    pub async fn fresh(&mut self, models: &[ModelDef], generator: &MigrationGenerator) -> Result<RunReport, AppError> {
        self.drop_all(models).await?;
        self.run_all(models, generator).await
    }

    /// Every registered migration plus any ledger rows that no longer have one, by version.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, AppError> {
        self.store.ensure_ledger(self.key_mode).await?;
        let records = self.store.records().await?;
        let matches = |m: &Migration, r: &MigrationRecord| {
            r.version == m.version && (self.key_mode == LedgerKeyMode::Version || r.name == m.name)
        };
        let mut out: Vec<MigrationStatus> = self
            .registry
            .all()
            .into_iter()
            .map(|m| MigrationStatus {
                version: m.version.clone(),
                name: m.name.clone(),
                applied: records.iter().any(|r| matches(m, r)),
                registered: true,
            })
            .collect();
        for r in &records {
            if !self.registry.all().into_iter().any(|m| matches(m, r)) {
                out.push(MigrationStatus {
                    version: r.version.clone(),
                    name: r.name.clone(),
                    applied: true,
                    registered: false,
                });
            }
        }
        out.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(out)
    }
}
