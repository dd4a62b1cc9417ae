use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::PostgresConf;

/// Ouvre le pool et vérifie la connexion. Un échec ici est fatal
/// au démarrage du processus.
pub async fn connect(cfg: &PostgresConf) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&cfg.connection_url())
        .await
        .context("postgres connection failed")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("postgres connection test failed")?;

    info!(host = %cfg.host, dbname = %cfg.dbname, "postgres connection established");
    Ok(pool)
}
