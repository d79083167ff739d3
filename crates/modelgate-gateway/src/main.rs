//! modelgate gateway binary.
//!
//! - Strict config load (`MODELGATE_CONFIG`, default `modelgate.yaml`)
//! - Composition root: policy engine, quota engine, router
//! - Periodic quota replenish on a tokio interval
//! - Graceful shutdown: mark draining, then stop accepting

use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use modelgate_core::error::{GateError, Result};
use modelgate_gateway::{app_state, config, quota, router};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.gateway.listen_addr()?;
    let replenish_every = Duration::from_millis(cfg.gateway.replenish_interval_ms);

    let state = app_state::AppState::new(cfg)?;
    let replenisher = quota::spawn_replenisher(state.quota(), state.metrics(), replenish_every);
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "modelgate-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| GateError::Internal(format!("failed to bind {listen}: {e}")))?;

    let drain_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            drain_state.set_draining();
            tracing::info!("shutdown requested, draining");
        })
        .await
        .map_err(|e| GateError::Internal(format!("server failed: {e}")))?;

    replenisher.abort();
    Ok(())
}
