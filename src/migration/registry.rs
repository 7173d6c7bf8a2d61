//! In-process migration index. Owned by the runner; appended at startup and by the generator.

use crate::error::AppError;
use crate::migration::artifact;
use std::path::Path;

/// One schema change. Identity is `(version, name)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    /// `YYYYMMDDHHMMSS`; lexical order is chronological order.
    pub version: String,
    pub name: String,
    pub up: String,
    pub down: String,
}

impl Migration {
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Migration {
            version: version.into(),
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        MigrationRegistry::default()
    }

    /// Returns false (and keeps the first) when `(version, name)` is already registered.
    pub fn register(&mut self, migration: Migration) -> bool {
        if self.get(&migration.version, &migration.name).is_some() {
            return false;
        }
        self.migrations.push(migration);
        true
    }

    /// Sorted by version; equal versions keep registration order.
    pub fn all(&self) -> Vec<&Migration> {
        let mut all: Vec<&Migration> = self.migrations.iter().collect();
        all.sort_by(|a, b| a.version.cmp(&b.version));
        all
    }

    pub fn get(&self, version: &str, name: &str) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version == version && m.name == name)
    }

    /// First migration registered under `version`.
    pub fn by_version(&self, version: &str) -> Option<&Migration> {
        self.all().into_iter().find(|m| m.version == version)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.migrations.iter().any(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Register every `<version>_<name>.up.sql` (and its `.down.sql`, when present) in `dir`.
    /// Returns how many were newly registered. A missing directory registers nothing.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, AppError> {
        let mut added = 0;
        for file in artifact::discover_sql(dir.as_ref())? {
            if self.register(file.read()?) {
                added += 1;
            }
        }
        tracing::debug!(dir = %dir.as_ref().display(), added, "loaded sql migrations");
        Ok(added)
    }
}

impl Extend<Migration> for MigrationRegistry {
    fn extend<T: IntoIterator<Item = Migration>>(&mut self, iter: T) {
        for m in iter {
            self.register(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_identity_is_ignored() {
        let mut r = MigrationRegistry::new();
        assert!(r.register(Migration::new("20240101000000", "create_users_table", "A", "B")));
        assert!(!r.register(Migration::new("20240101000000", "create_users_table", "C", "D")));
        assert!(r.register(Migration::new("20240101000000", "create_posts_table", "E", "F")));
        assert_eq!(r.len(), 2);
        assert_eq!(r.get("20240101000000", "create_users_table").map(|m| m.up.as_str()), Some("A"));
    }

    #[test]
    fn ordered_by_version_then_registration() {
        let mut r = MigrationRegistry::new();
        r.extend([
            Migration::new("20240102000000", "b", "", ""),
            Migration::new("20240101000000", "z", "", ""),
            Migration::new("20240101000000", "a", "", ""),
        ]);
        let names: Vec<&str> = r.all().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "b"]);
        assert_eq!(r.by_version("20240101000000").map(|m| m.name.as_str()), Some("z"));
        assert!(r.contains_name("b"));
    }
}
