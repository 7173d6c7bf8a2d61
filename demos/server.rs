//! Demo server: loads models from JSON, runs pending migrations, mounts common routes plus CRUD
//! routes per model under `APP_BASE_PATH/<table>`.

use axum::Router;
use scaffold_sdk::service::SOFT_DELETE_COLUMN;
use scaffold_sdk::{
    common_routes_with_ready, connect, entity_routes, load_models, read_model, AppState, DynRepository,
    MigrationGenerator, MigrationRegistry, Migrator, MySqlStore, RepositoryOptions, Settings,
};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scaffold_sdk=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let models = load_models(&settings.models_path)?;
    let pool = connect(&settings).await?;

    let generator = MigrationGenerator::new(&settings.migrations_dir);
    let mut registry = MigrationRegistry::new();
    registry.load_dir(&settings.migrations_dir)?;
    let store = MySqlStore::new(pool.clone()).with_table(&settings.ledger_table);
    let mut migrator = Migrator::new(store, registry);
    let report = migrator.run_all(&models, &generator).await?;
    tracing::info!(
        generated = report.generation.generated.len(),
        applied = report.applied_files.len() + report.applied.len(),
        "migrations up to date"
    );

    let mut api = Router::new();
    for def in &models {
        let soft_delete = read_model(def)?.has_column(SOFT_DELETE_COLUMN);
        let repo = DynRepository::with_definition(pool.clone(), def, RepositoryOptions { soft_delete })?;
        let table = def.table_name();
        tracing::info!(table = %table, soft_delete, "mounting entity routes");
        api = api.nest(&format!("/{}", table), entity_routes(repo));
    }

    let app = Router::new()
        .merge(common_routes_with_ready(AppState { pool }))
        .nest(&settings.base_path, api)
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024));

    let listener = TcpListener::bind(settings.bind_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
