//! Curfew - a countdown daemon that locks the workstation session
//!
//! This is the main entry point for the curfew application.

use std::sync::Arc;

use tracing::{info, warn};

use curfew::{
    api::create_router,
    config::Config,
    services::check_loginctl_available,
    state::AppState,
    tasks::countdown_task,
    utils::{claim_single_instance, shutdown_signal, InstanceClaim},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("curfew={},tower_http=info", config.log_level()))
        .init();

    info!("starting curfew v{}", env!("CARGO_PKG_VERSION"));
    info!("configuration: host={}, port={}", config.host, config.port);

    // Holding the listen socket is the single-instance lock. If another
    // process already holds it, it has been asked to show itself and this
    // process exits cleanly with no server started.
    let listener = match claim_single_instance(&config.address()).await? {
        InstanceClaim::Primary(listener) => listener,
        InstanceClaim::AlreadyRunning => return Ok(()),
    };

    // Locking degrades to a logged error when loginctl is missing; the
    // countdown itself keeps working.
    if let Err(e) = check_loginctl_available().await {
        warn!("{}", e);
    }

    // Create application state
    let state = Arc::new(AppState::new(
        config.port,
        config.host.clone(),
        config.state_store(),
        config.secret.clone(),
    ));

    // Pick up a countdown persisted by a previous run; expired or broken
    // state has already been discarded by the store.
    if let Err(e) = state.resume_from_store() {
        warn!("failed to resume persisted state: {}", e);
    }

    // Start the countdown background task
    let timer_state = Arc::clone(&state);
    tokio::spawn(async move {
        countdown_task(timer_state).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    info!("control API on http://{}", config.address());
    info!("endpoints:");
    info!("  POST /start  - start a countdown (duration as HH:MM:SS)");
    info!("  POST /extend - add time to the running countdown");
    info!("  POST /reset  - clear the countdown (secret-gated)");
    info!("  POST /focus  - ask a running instance to show itself");
    info!("  GET  /status - snapshot, uptime and last action");
    info!("  GET  /health - health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // A running countdown survives the restart through the state file.
    if let Err(e) = state.persist_current() {
        warn!("failed to persist state on shutdown: {}", e);
    }

    info!("shutdown complete");
    Ok(())
}
