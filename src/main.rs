use anyhow::{Context, Result};
use gatekeeper::api::create_router;
use gatekeeper::config::{env::config_path, load_or_default};
use gatekeeper::gatekeeper::init_global;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=info".into()),
        )
        .init();

    let path = config_path();
    let config = load_or_default(&path).with_context(|| format!("Failed to load {}", path))?;

    let gatekeeper = init_global(&config);
    let app = create_router(gatekeeper.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;

    info!(address = %config.server.bind_address, "Gatekeeper listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
    .context("Server error")?;

    gatekeeper.shutdown().await;
    Ok(())
}
