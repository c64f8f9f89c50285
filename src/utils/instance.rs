//! Single-instance guard
//!
//! Holding the listen socket is the system-wide exclusive lock: only one
//! process can bind it. A second launch signals the running instance to
//! show itself and exits without starting a server.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Outcome of the startup instance claim.
pub enum InstanceClaim {
    /// This process holds the listen socket; run the server.
    Primary(TcpListener),
    /// Another instance holds it and has been signalled; exit cleanly.
    AlreadyRunning,
}

/// Try to become the primary instance on `addr`.
///
/// Any bind failure other than the address being in use is a real error;
/// an in-use address means a sibling process is already serving.
pub async fn claim_single_instance(addr: &str) -> Result<InstanceClaim> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(InstanceClaim::Primary(listener)),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            info!("another instance already holds {}", addr);
            notify_running_instance(addr).await;
            Ok(InstanceClaim::AlreadyRunning)
        }
        Err(e) => Err(e).with_context(|| format!("failed to bind {}", addr)),
    }
}

/// Ask the running instance to show itself. Best-effort with a short
/// timeout: if the holder of the socket is not us, we still exit quietly.
async fn notify_running_instance(addr: &str) {
    // a wildcard bind address is not a connectable target
    let target = addr.replace("0.0.0.0", "127.0.0.1");
    let url = format!("http://{}/focus", target);

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("failed to build focus client: {}", e);
            return;
        }
    };

    match client.post(&url).send().await {
        Ok(response) if response.status().is_success() => {
            info!("asked the running instance to show itself");
        }
        Ok(response) => {
            warn!("running instance answered {} to the focus signal", response.status());
        }
        Err(e) => {
            warn!("failed to signal the running instance: {}", e);
        }
    }
}
