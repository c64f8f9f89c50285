//! Workstation session locking

use tokio::process::Command;
use tracing::info;

/// Lock the interactive session.
///
/// Best-effort: the caller logs a failure and carries on, the countdown
/// still completes either way.
pub async fn execute_session_lock() -> Result<(), String> {
    info!("locking the interactive session");

    let output = Command::new("loginctl")
        .args(["lock-session"])
        .output()
        .await
        .map_err(|e| format!("failed to execute loginctl lock-session: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("loginctl lock-session failed: {}", stderr));
    }

    info!("session lock command executed");
    Ok(())
}

/// Check if loginctl is available on the system. The countdown still runs
/// without it, the lock side effect just degrades to a logged error.
pub async fn check_loginctl_available() -> Result<(), String> {
    Command::new("loginctl")
        .arg("--version")
        .output()
        .await
        .map_err(|_| "loginctl is not available, session locking is degraded".to_string())?;

    info!("loginctl is available");
    Ok(())
}
