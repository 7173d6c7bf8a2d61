//! `migrate`: generate, apply and roll back schema migrations for a JSON model set.

use clap::{Parser, Subcommand};
use scaffold_sdk::migration::{LedgerKeyMode, MigrationStatus};
use scaffold_sdk::{
    connect, load_models, MigrationGenerator, MigrationRegistry, Migrator, MySqlStore, RollbackTarget, Settings,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "migrate", version, about = "Schema migrations for scaffold-sdk models")]
struct Cli {
    /// Model definitions (JSON). Defaults to MODELS_PATH.
    #[arg(long)]
    models: Option<PathBuf>,

    /// Migration artifact directory. Defaults to MIGRATIONS_DIR.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Key the ledger on version alone instead of (version, name).
    #[arg(long)]
    version_key: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write migrations for models that have none yet. No database needed.
    Generate,
    /// Generate for missing tables, then apply everything pending.
    Up,
    /// Roll back the most recently applied migration.
    Down,
    /// Roll back one migration.
    Rollback {
        /// Version to roll back; the latest applied one when omitted.
        #[arg(long)]
        version: Option<String>,
    },
    /// Drop every model table, then re-apply registered migrations.
    Refresh,
    /// Drop every model table, then run `up`.
    Fresh,
    /// List known migrations and whether each is applied.
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scaffold_sdk=info".parse()?))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let models_path = cli.models.unwrap_or_else(|| settings.models_path.clone());
    let dir = cli.dir.unwrap_or_else(|| settings.migrations_dir.clone());
    let models = load_models(&models_path)?;
    let generator = MigrationGenerator::new(&dir);

    let mut registry = MigrationRegistry::new();
    let loaded = registry.load_dir(&dir)?;
    tracing::debug!(count = loaded, dir = %dir.display(), "loaded migrations from disk");

    if let Command::Generate = cli.command {
        let report = generator.generate(&models, &mut registry)?;
        for m in &report.generated {
            println!("generated {}_{}", m.version, m.name);
        }
        println!("{} generated, {} skipped", report.generated.len(), report.skipped.len());
        report.into_result()?;
        return Ok(());
    }

    let pool = connect(&settings).await?;
    let store = MySqlStore::new(pool).with_table(&settings.ledger_table);
    let key_mode = if cli.version_key {
        LedgerKeyMode::Version
    } else {
        LedgerKeyMode::VersionName
    };
    let mut migrator = Migrator::new(store, registry).with_key_mode(key_mode);

    match cli.command {
        Command::Generate => {}
        Command::Up => {
            let report = migrator.run_all(&models, &generator).await?;
            println!(
                "{} generated, {} files applied, {} registered applied",
                report.generation.generated.len(),
                report.applied_files.len(),
                report.applied.len()
            );
        }
        Command::Down => {
            let m = migrator.rollback(RollbackTarget::Latest).await?;
            println!("rolled back {}_{}", m.version, m.name);
        }
        Command::Rollback { version } => {
            let target = version.map(RollbackTarget::Version).unwrap_or(RollbackTarget::Latest);
            let m = migrator.rollback(target).await?;
            println!("rolled back {}_{}", m.version, m.name);
        }
        Command::Refresh => {
            let applied = migrator.refresh(&models).await?;
            println!("refreshed, {} migrations applied", applied.len());
        }
        Command::Fresh => {
            let report = migrator.fresh(&models, &generator).await?;
            println!(
                "fresh, {} files applied, {} registered applied",
                report.applied_files.len(),
                report.applied.len()
            );
        }
        Command::Status => print_status(&migrator.status().await?),
    }
    Ok(())
}

fn print_status(rows: &[MigrationStatus]) {
    if rows.is_empty() {
        println!("no migrations");
        return;
    }
    println!("{:<16} {:<9} NAME", "VERSION", "STATE");
    for r in rows {
        let state = match (r.applied, r.registered) {
            (true, true) => "applied",
            (false, _) => "pending",
            (true, false) => "orphaned",
        };
        println!("{:<16} {:<9} {}", r.version, state, r.name);
    }
}
