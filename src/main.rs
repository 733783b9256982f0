use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use compras_api as api;
use api::store::{pocketbase::PocketBaseClient, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    if cfg.pocketbase_token.is_none() {
        info!("No PocketBase service token configured; collection rules must allow anonymous access");
    }

    // Record store (PocketBase REST API)
    let client = PocketBaseClient::new(cfg.pocketbase_config())
        .context("failed to build PocketBase client")?;
    let store: Arc<dyn RecordStore> = Arc::new(client);

    let app_state = api::AppState::new(cfg.clone(), store);
    let app = api::build_router(app_state);

    let host: std::net::IpAddr = cfg.host.parse().unwrap_or_else(|_| {
        warn!(host = %cfg.host, "invalid host; binding to 0.0.0.0");
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::new(host, cfg.port);
    info!(pocketbase = %cfg.pocketbase_url, "compras-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("compras-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
