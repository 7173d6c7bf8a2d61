//! Runtime settings read from the environment (after `.env` is loaded by the binary).

use crate::error::ConfigError;
use crate::migration::DEFAULT_LEDGER_TABLE;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub migrations_dir: PathBuf,
    pub models_path: PathBuf,
    pub ledger_table: String,
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Ok(Settings {
            database_url: get("DATABASE_URL", "mysql://root@localhost:3306/scaffold"),
            migrations_dir: get("MIGRATIONS_DIR", "migrations/generated").into(),
            models_path: get("MODELS_PATH", "models.json").into(),
            ledger_table: get("LEDGER_TABLE", DEFAULT_LEDGER_TABLE),
            host: get("APP_HOST", "0.0.0.0"),
            port: number("APP_PORT", &get("APP_PORT", "8080"))?,
            base_path: get("APP_BASE_PATH", "/api/v1"),
            max_connections: number("DB_MAX_CONNECTIONS", &get("DB_MAX_CONNECTIONS", "5"))?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a positive number, got '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.database_url, "mysql://root@localhost:3306/scaffold");
        assert_eq!(s.migrations_dir, PathBuf::from("migrations/generated"));
        assert_eq!(s.ledger_table, "schema_migrations");
        assert_eq!(s.bind_addr(), "0.0.0.0:8080");
        assert_eq!(s.base_path, "/api/v1");
        assert_eq!(s.max_connections, 5);
    }

    #[test]
    fn overrides_and_blank_values() {
        let s = Settings::from_lookup(lookup(&[("APP_PORT", "9000"), ("APP_HOST", "  "), ("LEDGER_TABLE", "ledger")])).unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.ledger_table, "ledger");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Settings::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(m) if m.contains("DB_MAX_CONNECTIONS")));
        assert!(Settings::from_lookup(lookup(&[("APP_PORT", "70000")])).is_err());
    }
}
