//! Generate `create_<table>_table` migrations from model definitions.

use crate::error::AppError;
use crate::migration::artifact;
use crate::migration::registry::{Migration, MigrationRegistry};
use crate::model::{read_model, ModelDef, ModelDescriptor};
use crate::sql::ddl;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

pub fn migration_name(table: &str) -> String {
    format!("create_{}_table", table)
}

/// Outcome of one generation batch. Failures are per model; other models still generate.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub generated: Vec<Migration>,
    /// Tables whose migration already existed.
    pub skipped: Vec<String>,
    /// (model name, error)
    pub failed: Vec<(String, AppError)>,
}

impl GenerationReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Generated migrations, or the first failure.
    pub fn into_result(self) -> Result<Vec<Migration>, AppError> {
        match self.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(self.generated),
        }
    }
}

/// Stamp for `now`, or one second past `after` when that does not sort earlier. Every migration
/// gets its own version, so a version-keyed ledger never conflates two of them.
fn next_version(now: DateTime<Utc>, after: Option<&str>) -> String {
    let stamp = artifact::version_stamp(now);
    match after {
        Some(prev) if prev >= stamp.as_str() => NaiveDateTime::parse_from_str(prev, artifact::VERSION_FORMAT)
            .map(|t| (t + Duration::seconds(1)).format(artifact::VERSION_FORMAT).to_string())
            .unwrap_or(stamp),
        _ => stamp,
    }
}

pub struct MigrationGenerator {
    dir: PathBuf,
}

impl MigrationGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MigrationGenerator { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Up (table then indexes) and down statements for a model.
    pub fn table_sql(model: &ModelDescriptor) -> (String, String) {
        let mut up = ddl::create_table(model);
        let indexes = ddl::index_statements(model);
        if !indexes.is_empty() {
            up.push_str("\n\n");
            up.push_str(&indexes.join("\n"));
        }
        (up, ddl::drop_table(&model.table))
    }

    pub fn generate(&self, models: &[ModelDef], registry: &mut MigrationRegistry) -> Result<GenerationReport, AppError> {
        self.generate_at(models, registry, Utc::now())
    }

    /// Generate with a fixed clock. Skips models whose migration already exists on disk or in
    /// `registry`; newly generated migrations are written and registered.
    pub fn generate_at(
        &self,
        models: &[ModelDef],
        registry: &mut MigrationRegistry,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport, AppError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| AppError::io(&self.dir, e))?;
        let mut last = self.latest_version(registry)?;
        let mut report = GenerationReport::default();

        for def in models {
            let table = def.table_name();
            let name = migration_name(&table);
            match self.exists(&name, registry) {
                Ok(true) => {
                    tracing::warn!(table = %table, "migration already exists, skipping");
                    report.skipped.push(table);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed.push((def.name.clone(), e));
                    continue;
                }
            }
            let version = next_version(now, last.as_deref());
            match self.generate_one(def, &version, &name) {
                Ok(migration) => {
                    tracing::info!(table = %table, version = %version, "generated migration");
                    registry.register(migration.clone());
                    report.generated.push(migration);
                    last = Some(version);
                }
                Err(e) => {
                    tracing::error!(model = %def.name, error = %e, "migration generation failed");
                    report.failed.push((def.name.clone(), e));
                }
            }
        }
        Ok(report)
    }

    /// Highest version known to the registry or present on disk.
    fn latest_version(&self, registry: &MigrationRegistry) -> Result<Option<String>, AppError> {
        let on_disk = artifact::discover_sql(&self.dir)?.into_iter().map(|a| a.version);
        let registered = registry.all().into_iter().map(|m| m.version.clone());
        Ok(on_disk.chain(registered).max())
    }

    fn exists(&self, name: &str, registry: &MigrationRegistry) -> Result<bool, AppError> {
        Ok(registry.contains_name(name) || artifact::migration_exists(&self.dir, name)?)
    }

    fn generate_one(&self, def: &ModelDef, version: &str, name: &str) -> Result<Migration, AppError> {
        let model = read_model(def).map_err(|e| AppError::Generation {
            model: def.name.clone(),
            reason: e.to_string(),
        })?;
        let (up, down) = Self::table_sql(&model);
        let migration = Migration::new(version, name, up, down);
        artifact::write(&self.dir, &migration)?;
        Ok(migration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, SemanticType};
    use chrono::TimeZone;

    fn user() -> ModelDef {
        ModelDef::new("User")
            .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey;autoIncrement"))
            .field(FieldSpec::new("Email", SemanticType::String).tag("uniqueIndex"))
    }

    #[test]
    fn table_sql_appends_indexes_after_table() {
        let (up, down) = MigrationGenerator::table_sql(&read_model(&user()).unwrap());
        assert!(up.starts_with("CREATE TABLE IF NOT EXISTS users ("));
        assert!(up.ends_with(";\n\nCREATE UNIQUE INDEX uidx_users_email ON users (email);"));
        assert_eq!(down, "DROP TABLE IF EXISTS users;");
    }

    #[test]
    fn batch_versions_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let gen = MigrationGenerator::new(dir.path());
        let mut registry = MigrationRegistry::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let log = ModelDef::new("ActivityLog")
            .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey"));

        let report = gen.generate_at(&[user(), log], &mut registry, now).unwrap();
        let versions: Vec<&str> = report.generated.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, ["20240501080000", "20240501080001"]);

        // A later batch in the same second still sorts after what is on disk.
        let tag = ModelDef::new("Tag").field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey"));
        let report = gen.generate_at(&[tag], &mut MigrationRegistry::new(), now).unwrap();
        assert_eq!(report.generated[0].version, "20240501080002");
    }

    #[test]
    fn next_version_ignores_older_and_unparsable_floors() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(next_version(now, None), "20240501080000");
        assert_eq!(next_version(now, Some("20230101000000")), "20240501080000");
        assert_eq!(next_version(now, Some("20240501080059")), "20240501080100");
        assert_eq!(next_version(now, Some("99")), "20240501080000");
    }

    #[test]
    fn bad_model_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let gen = MigrationGenerator::new(dir.path());
        let mut registry = MigrationRegistry::new();
        let broken = ModelDef::new("Broken").field(FieldSpec::new("Body", SemanticType::String));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let report = gen.generate_at(&[broken, user()], &mut registry, now).unwrap();
        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.generated[0].version, "20240501080000");
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, AppError::Generation { ref model, .. } if model == "Broken"));
        assert!(registry.get("20240501080000", "create_users_table").is_some());
        assert!(report.into_result().is_err());
    }
}
