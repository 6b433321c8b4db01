use anyhow::Context;
use cellar_backend::config::Config;
use cellar_backend::{RateLimitConfig, create_app};
use cellar_db::Database;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting cellar backend server...");

    let config = Config::from_env()?;
    let rate_limit = RateLimitConfig::from(&config);
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, media_root={}, debug={}",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.media_root.display(),
        config.debug
    );
    tracing::info!(
        "Rate limits: global={}/{}s, api={}/{}s",
        rate_limit.global_max,
        rate_limit.global_window.as_secs(),
        rate_limit.api_max,
        rate_limit.api_window.as_secs()
    );

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;
    tokio::fs::create_dir_all(&config.media_root)
        .await
        .with_context(|| format!("creating media root {}", config.media_root.display()))?;

    let app = create_app(db, &config);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
