//! stashbox - content metadata service
//!
//! All operations are exposed via GraphQL at /graphql.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stashbox::app::{AppState, build_app};
use stashbox::config::Config;
use stashbox::db::Database;
use stashbox::models;
use stashbox::user::{AccountService, LogMailer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stashbox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting stashbox");

    if let Some(parent) = Path::new(&config.database_url).parent()
        && !config.database_url.starts_with("sqlite:")
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = Database::connect(
        &config.sqlite_url(),
        config.database_max_connections,
        models::registry(),
    )
    .await?;
    let sync = db.sync_schema().await?;
    tracing::info!(
        tables_created = sync.tables_created.len(),
        columns_added = sync.columns_added.len(),
        "Database ready"
    );

    let accounts = AccountService::new(db.clone(), Arc::new(LogMailer), config.activation_config());
    let lookup = accounts.clear_expired_activations().await?;
    tracing::debug!(swept_at = %lookup.swept_at(), "Swept expired activations");

    let state = AppState::new(db, config.loader_config());
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
