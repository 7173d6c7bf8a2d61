//! Durable migration artifacts: a generated Rust registration stub `m<version>_<name>.rs` plus
//! plain SQL sidecars `<version>_<name>.up.sql` / `.down.sql`.

use crate::error::AppError;
use crate::migration::registry::Migration;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Version stamp for `now`; lexical order equals chronological order.
pub fn version_stamp(now: DateTime<Utc>) -> String {
    now.format(VERSION_FORMAT).to_string()
}

static SQL_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_(.+)\.up\.sql$").expect("constant sql filename pattern"));
static STUB_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^m(\d+)_(.+)\.rs$").expect("constant stub filename pattern"));

fn version_and_name(re: &Regex, file_name: &str) -> Option<(String, String)> {
    re.captures(file_name)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// `20240120120000_create_users_table.up.sql` -> ("20240120120000", "create_users_table").
pub fn parse_sql_filename(file_name: &str) -> Option<(String, String)> {
    version_and_name(&SQL_FILE, file_name)
}

/// `m20240120120000_create_users_table.rs` -> ("20240120120000", "create_users_table").
pub fn parse_stub_filename(file_name: &str) -> Option<(String, String)> {
    version_and_name(&STUB_FILE, file_name)
}

/// A discovered `.up.sql` file and its optional `.down.sql` partner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlArtifact {
    pub version: String,
    pub name: String,
    pub file_name: String,
    pub up_path: PathBuf,
    pub down_path: Option<PathBuf>,
}

impl SqlArtifact {
    pub fn read(&self) -> Result<Migration, AppError> {
        let up = fs::read_to_string(&self.up_path).map_err(|e| AppError::io(&self.up_path, e))?;
        let down = match &self.down_path {
            Some(p) => fs::read_to_string(p).map_err(|e| AppError::io(p, e))?,
            None => String::new(),
        };
        Ok(Migration::new(&self.version, &self.name, up, down))
    }
}

fn file_names(dir: &Path) -> Result<Vec<String>, AppError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| AppError::io(dir, e))? {
        let entry = entry.map_err(|e| AppError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Every `.up.sql` in `dir`, in filename (version) order. A missing directory yields none.
pub fn discover_sql(dir: &Path) -> Result<Vec<SqlArtifact>, AppError> {
    let mut out = Vec::new();
    for file_name in file_names(dir)? {
        if !file_name.ends_with(".up.sql") {
            continue;
        }
        let Some((version, name)) = parse_sql_filename(&file_name) else {
            tracing::warn!(file = %file_name, "skipping sql file with unexpected name");
            continue;
        };
        let down = dir.join(format!("{}_{}.down.sql", version, name));
        out.push(SqlArtifact {
            up_path: dir.join(&file_name),
            down_path: down.is_file().then_some(down),
            version,
            name,
            file_name,
        });
    }
    Ok(out)
}

/// True when a stub or SQL sidecar for migration `name` exists in `dir`.
pub fn migration_exists(dir: &Path, name: &str) -> Result<bool, AppError> {
    for file_name in file_names(dir)? {
        let parsed = parse_stub_filename(&file_name).or_else(|| parse_sql_filename(&file_name));
        if parsed.is_some_and(|(_, n)| n == name) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn stub_file_name(m: &Migration) -> String {
    format!("m{}_{}.rs", m.version, m.name)
}

/// Write the stub and both SQL sidecars. Returns the written paths.
///
/// Each file is first written to a hidden temporary name, then all are renamed into place. A
/// failure at any step removes whatever was already written, so a migration is on disk either
/// completely or not at all.
pub fn write(dir: &Path, m: &Migration) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;
    let files = [
        (stub_file_name(m), render_stub(m)),
        (format!("{}_{}.up.sql", m.version, m.name), m.up.clone()),
        (format!("{}_{}.down.sql", m.version, m.name), m.down.clone()),
    ];

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    for (file_name, content) in &files {
        let tmp = dir.join(format!(".{}.tmp", file_name));
        if let Err(e) = fs::write(&tmp, content) {
            discard(staged.iter().map(|(t, _)| t).chain([&tmp]));
            return Err(AppError::io(&tmp, e));
        }
        staged.push((tmp, dir.join(file_name)));
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            discard(written.iter().chain(staged[i..].iter().map(|(t, _)| t)));
            return Err(AppError::io(path, e));
        }
        written.push(path.clone());
    }
    Ok(written)
}

fn discard<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "could not remove partial migration file");
            }
        }
    }
}

/// Rust source that registers the migration when its `register` is called at startup.
pub fn render_stub(m: &Migration) -> String {
    format!(
        "// Generated by `migrate generate`. Do not edit.\n\
         use scaffold_sdk::migration::{{Migration, MigrationRegistry}};\n\
         \n\
         pub fn register(registry: &mut MigrationRegistry) {{\n\
         \x20   registry.register(Migration::new(\n\
         \x20       \"{}\",\n\
         \x20       \"{}\",\n\
         \x20       {},\n\
         \x20       {},\n\
         \x20   ));\n\
         }}\n",
        m.version,
        m.name,
        raw_string(&m.up),
        raw_string(&m.down)
    )
}

/// Raw string literal with enough `#` marks for `s`.
fn raw_string(s: &str) -> String {
    let mut hashes = 1;
    while s.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let marks = "#".repeat(hashes);
    format!("r{}\"{}\"{}", marks, s, marks)
}
