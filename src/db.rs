//! Pool construction and first-run database creation.

use crate::error::{AppError, ConfigError};
use crate::settings::Settings;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection, MySqlPool};
use std::str::FromStr;

/// Create the database named in `database_url` when the server does not have it yet.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (server_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() {
        return Ok(());
    }
    let opts = MySqlConnectOptions::from_str(&server_url)
        .map_err(|e| ConfigError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn = opts.connect().await?;
    let sql = format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        db_name.replace('`', "``")
    );
    sqlx::raw_sql(&sql).execute(&mut conn).await?;
    conn.close().await?;
    tracing::info!(database = %db_name, "database ready");
    Ok(())
}

pub async fn connect(settings: &Settings) -> Result<MySqlPool, AppError> {
    ensure_database_exists(&settings.database_url).await?;
    let pool = MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    Ok(pool)
}

/// `mysql://u@h:3306/app?ssl-mode=DISABLED` -> (`mysql://u@h:3306/?ssl-mode=DISABLED`, `app`).
fn split_database_url(url: &str) -> Result<(String, String), AppError> {
    let authority_start = url
        .find("://")
        .map(|i| i + 3)
        .ok_or_else(|| ConfigError::Validation("DATABASE_URL: missing scheme".into()))?;
    let Some(slash) = url[authority_start..].find('/').map(|i| i + authority_start) else {
        return Ok((url.to_string(), String::new()));
    };
    let rest = &url[slash + 1..];
    let (db_name, query) = match rest.split_once('?') {
        Some((name, q)) => (name, format!("?{}", q)),
        None => (rest, String::new()),
    };
    Ok((format!("{}/{}", &url[..slash], query), db_name.trim().to_string()))
}
