//! Scaffold SDK: model-driven MySQL schema migrations and a generic CRUD query pipeline.

pub mod case;
pub mod db;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use db::{connect, ensure_database_exists};
pub use error::{AppError, ConfigError};
pub use migration::{Migration, MigrationGenerator, MigrationRegistry, Migrator, MySqlStore, RollbackTarget};
pub use model::{load_models, read_model, Model, ModelDef, ModelDescriptor};
pub use query::{Meta, QueryParams};
pub use response::{success_created, success_one, success_page, Envelope};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use service::{DynRepository, Identifier, Repository, RepositoryOptions};
pub use settings::Settings;
pub use state::AppState;
