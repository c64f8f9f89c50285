//! Countdown background task

use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    services::execute_session_lock,
    state::{AppState, TimerPhase, TimerSnapshot},
};

/// Background task that drives the periodic tick while a countdown runs.
///
/// The task arms itself when the timer is (or becomes) `Running` and
/// disarms when a control transition moves it out of `Running`. This is
/// the single recurring tick subscription in the process; remaining time
/// is recomputed from absolute timestamps on every tick, so a late or
/// skipped tick never accumulates drift.
pub async fn countdown_task(state: Arc<AppState>) {
    info!("starting countdown task");

    let mut change_rx = state.timer_change_tx.subscribe();

    loop {
        // Re-check the phase directly instead of trusting notifications:
        // a countdown resumed from disk may be running before the first
        // broadcast is observed.
        let armed = match state.snapshot() {
            Ok(snapshot) => snapshot.phase == TimerPhase::Running,
            Err(e) => {
                error!("failed to read timer state: {}", e);
                false
            }
        };

        if armed {
            run_countdown(&state, &mut change_rx).await;
        }

        // Wait for the next control transition, then re-evaluate.
        match change_rx.recv().await {
            Ok(snapshot) => {
                debug!("countdown task observed transition to {:?}", snapshot.phase);
            }
            Err(RecvError::Lagged(missed)) => {
                debug!("countdown task lagged behind {} notifications", missed);
            }
            Err(RecvError::Closed) => {
                info!("timer channel closed, stopping countdown task");
                break;
            }
        }
    }
}

/// Tick once per second until the countdown expires or is cancelled.
async fn run_countdown(
    state: &Arc<AppState>,
    change_rx: &mut broadcast::Receiver<TimerSnapshot>,
) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Periodic tick: recompute remaining time and persist it
            _ = ticker.tick() => {
                match state.tick() {
                    Ok((snapshot, expired_now)) => {
                        if expired_now {
                            info!("countdown expired, locking the session");
                            if let Err(e) = execute_session_lock().await {
                                error!("failed to lock session: {}", e);
                            }
                            break;
                        }
                        debug!("tick: {} remaining", snapshot.display);
                    }
                    Err(e) => error!("tick failed: {}", e),
                }
            }

            // Control transition: cancel if the timer left Running
            change = change_rx.recv() => {
                match change {
                    Ok(snapshot) => {
                        if snapshot.phase != TimerPhase::Running {
                            info!("countdown cancelled");
                            break;
                        }
                        // an extend keeps the countdown armed
                        debug!("countdown updated, {} remaining", snapshot.display);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        debug!("countdown lagged behind {} notifications", missed);
                    }
                    Err(RecvError::Closed) => {
                        info!("timer channel closed mid-countdown");
                        break;
                    }
                }
            }
        }
    }
}
