//! Schema migrations: generation from model definitions, durable artifacts, the applied-migration
//! ledger and the runner.

pub mod artifact;
pub mod generator;
pub mod ledger;
pub mod migrator;
pub mod registry;
pub mod store;

pub use generator::{migration_name, GenerationReport, MigrationGenerator};
pub use ledger::{LedgerKeyMode, MigrationRecord, MigrationStore, RecordOutcome, DEFAULT_LEDGER_TABLE};
pub use migrator::{MigrationStatus, Migrator, RollbackTarget, RunReport};
pub use registry::{Migration, MigrationRegistry};
pub use store::MySqlStore;
