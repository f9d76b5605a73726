use anyhow::{Context, Result};
use axum::Router;
use geolog::{
    config::{AppConfig, StorageBackendKind},
    routes,
    services::{
        storage::{Gcs, LocalFs, ObjectStore},
        user_service::UserService,
    },
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting geolog with config: {:?}", cfg);

    // --- Initialize SQLite connection pool ---
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .context("parsing database URL")?
        .create_if_missing(true);

    let db_path = connect_options.get_filename();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(cfg.db_max_connections)
            .connect_with(connect_options)
            .await
            .context("connecting to database")?,
    );

    // --- Initialize object store ---
    let storage = build_object_store(&cfg).await?;
    tracing::info!(
        backend = storage.name(),
        bucket = %cfg.bucket,
        "Object store ready"
    );

    // --- Build router ---
    let state = AppState::new(
        UserService::new(db),
        storage,
        cfg.bucket.clone(),
        cfg.public_url_base.clone(),
    );
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_object_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.storage_backend {
        StorageBackendKind::Gcs => match cfg.gcs_endpoint.as_deref() {
            Some(endpoint) => Arc::new(Gcs::without_token(endpoint, &cfg.bucket)),
            None => Arc::new(
                Gcs::new(&cfg.bucket)
                    .await
                    .context("initializing Google Cloud Storage client")?,
            ),
        },
        StorageBackendKind::Local => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(LocalFs::new(&cfg.storage_dir, &cfg.bucket))
        }
    };
    Ok(store)
}
