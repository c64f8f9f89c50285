//! Main application state management

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::store::{PersistedState, StateStore};
use crate::utils::clock::parse_hms;

use super::timer_state::{TimerError, TimerPhase, TimerSnapshot, TimerState};

/// Owns the countdown and everything the API and background task share.
///
/// Only the methods here mutate [`TimerState`]; the countdown task and the
/// HTTP handlers communicate exclusively through them and the two channels.
#[derive(Debug)]
pub struct AppState {
    /// The countdown itself
    timer: Mutex<TimerState>,
    /// Persisted-state file adapter
    pub store: StateStore,
    /// Shared secret gating the reset command
    reset_secret: String,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Control transitions (start/extend/reset/expire) for the countdown task
    pub timer_change_tx: broadcast::Sender<TimerSnapshot>,
    /// Per-tick snapshots for display surfaces
    pub tick_update_tx: watch::Sender<TimerSnapshot>,
    /// Keep the receiver alive to prevent channel closure
    pub _tick_update_rx: watch::Receiver<TimerSnapshot>,
}

impl AppState {
    /// Create a new AppState with an idle timer.
    pub fn new(port: u16, host: String, store: StateStore, reset_secret: String) -> Self {
        let (timer_change_tx, _) = broadcast::channel(100);
        let timer = TimerState::new();
        let (tick_update_tx, tick_update_rx) = watch::channel(timer.snapshot(Utc::now()));

        Self {
            timer: Mutex::new(timer),
            store,
            reset_secret,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
            timer_change_tx,
            tick_update_tx,
            _tick_update_rx: tick_update_rx,
        }
    }

    fn lock_timer(&self) -> Result<MutexGuard<'_, TimerState>, TimerError> {
        self.timer
            .lock()
            .map_err(|e| TimerError::Internal(format!("failed to lock timer state: {}", e)))
    }

    /// Start a countdown from an `"HH:MM:SS"` duration string.
    pub fn start_timer(&self, duration: &str) -> Result<TimerSnapshot, TimerError> {
        let seconds = parse_hms(duration)?;
        let now = Utc::now();

        let snapshot = {
            let mut timer = self.lock_timer()?;
            timer.start(now, seconds)?;
            timer.snapshot(now)
        };

        info!("countdown started: {} ({} s)", snapshot.display, seconds);
        self.store.save(&Self::to_persisted(&snapshot));
        self.record_action("start");
        self.notify_change(snapshot.clone());
        Ok(snapshot)
    }

    /// Add `seconds` to the running countdown.
    pub fn extend_timer(&self, seconds: u64) -> Result<TimerSnapshot, TimerError> {
        let now = Utc::now();

        let snapshot = {
            let mut timer = self.lock_timer()?;
            timer.extend(now, seconds)?;
            timer.snapshot(now)
        };

        info!("countdown extended by {} s, now {}", seconds, snapshot.display);
        self.store.save(&Self::to_persisted(&snapshot));
        self.record_action("extend");
        self.notify_change(snapshot.clone());
        Ok(snapshot)
    }

    /// Reset the countdown to idle. Gated by the shared secret; a wrong
    /// credential changes nothing and is reported as a denial.
    pub fn reset_timer(&self, secret: &str) -> Result<TimerSnapshot, TimerError> {
        if secret != self.reset_secret {
            warn!("reset denied: wrong credential");
            self.record_action("reset-denied");
            return Err(TimerError::BadCredential);
        }

        let now = Utc::now();
        let snapshot = {
            let mut timer = self.lock_timer()?;
            timer.reset();
            timer.snapshot(now)
        };

        info!("countdown reset");
        self.store.delete();
        self.record_action("reset");
        self.notify_change(snapshot.clone());
        Ok(snapshot)
    }

    /// One periodic tick: recompute remaining time, persist it, and move to
    /// `Expired` when it reaches zero. Returns the fresh snapshot and
    /// whether expiry happened on this call.
    pub fn tick(&self) -> Result<(TimerSnapshot, bool), TimerError> {
        let now = Utc::now();

        let (snapshot, expired_now) = {
            let mut timer = self.lock_timer()?;
            let expired_now = timer.expire_if_due(now);
            (timer.snapshot(now), expired_now)
        };

        if expired_now {
            info!("time's up");
            self.store.delete();
            self.notify_change(snapshot.clone());
        } else if snapshot.phase == TimerPhase::Running {
            self.store.save(&Self::to_persisted(&snapshot));
            self.push_tick(snapshot.clone());
        }

        Ok((snapshot, expired_now))
    }

    /// Resume a persisted countdown, if a live one is on disk.
    pub fn resume_from_store(&self) -> Result<Option<TimerSnapshot>, TimerError> {
        let now = Utc::now();

        let persisted = match self.store.load(now) {
            Some(persisted) => persisted,
            None => return Ok(None),
        };

        let started_at = match persisted.start_timestamp {
            Some(started_at) => started_at,
            // load() filters these out, but don't trust the disk
            None => return Ok(None),
        };

        let snapshot = {
            let mut timer = self.lock_timer()?;
            timer.resume(started_at, persisted.original_duration_seconds)?;
            timer.snapshot(now)
        };

        info!(
            "resumed countdown from {}: {} remaining",
            self.store.path().display(),
            snapshot.display
        );
        self.record_action("resume");
        self.push_tick(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Current snapshot without mutating anything.
    pub fn snapshot(&self) -> Result<TimerSnapshot, TimerError> {
        let timer = self.lock_timer()?;
        Ok(timer.snapshot(Utc::now()))
    }

    /// Persist whatever is current. Used on graceful shutdown; an idle or
    /// expired timer removes the file instead.
    pub fn persist_current(&self) -> Result<(), TimerError> {
        let snapshot = self.snapshot()?;
        self.store.save(&Self::to_persisted(&snapshot));
        Ok(())
    }

    /// Another instance asked us to show ourselves: announce the current
    /// state so it is visible in the logs and on the watch channel.
    pub fn handle_focus_request(&self) -> Result<TimerSnapshot, TimerError> {
        let snapshot = self.snapshot()?;
        info!(
            "focus requested by another instance (phase {:?}, {} remaining)",
            snapshot.phase, snapshot.display
        );
        self.record_action("focus");
        self.push_tick(snapshot.clone());
        Ok(snapshot)
    }

    fn to_persisted(snapshot: &TimerSnapshot) -> PersistedState {
        PersistedState {
            original_duration_seconds: snapshot.original_duration_seconds,
            start_timestamp: snapshot.started_at,
            is_running: snapshot.phase == TimerPhase::Running,
        }
    }

    /// Update last action tracking
    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Notify the countdown task and display surfaces of a control
    /// transition.
    fn notify_change(&self, snapshot: TimerSnapshot) {
        self.push_tick(snapshot.clone());
        if let Err(e) = self.timer_change_tx.send(snapshot) {
            warn!("failed to send timer change notification: {}", e);
        }
    }

    fn push_tick(&self, snapshot: TimerSnapshot) {
        if let Err(e) = self.tick_update_tx.send(snapshot) {
            warn!("failed to send tick update: {}", e);
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn app_in(dir: &tempfile::TempDir) -> AppState {
        let store = StateStore::new(dir.path().join("timer-state.json"));
        AppState::new(20553, "127.0.0.1".to_string(), store, "hunter2".to_string())
    }

    #[test]
    fn start_persists_and_notifies() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);
        let mut rx = app.timer_change_tx.subscribe();

        let snap = app.start_timer("00:10:00").unwrap();
        assert_eq!(snap.phase, TimerPhase::Running);
        assert_eq!(snap.remaining_seconds, 600);
        assert!(app.store.path().exists());

        let notified = rx.try_recv().unwrap();
        assert_eq!(notified.phase, TimerPhase::Running);
    }

    #[test]
    fn malformed_duration_is_an_input_error() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);

        assert!(matches!(
            app.start_timer("ten minutes"),
            Err(TimerError::InvalidDuration(_))
        ));
        assert!(matches!(
            app.start_timer("00:00:00"),
            Err(TimerError::InvalidDuration(_))
        ));
        assert!(!app.store.path().exists());
    }

    #[test]
    fn wrong_secret_leaves_state_running() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);
        app.start_timer("01:00:00").unwrap();

        assert_eq!(app.reset_timer("password"), Err(TimerError::BadCredential));

        let snap = app.snapshot().unwrap();
        assert_eq!(snap.phase, TimerPhase::Running);
        assert!(app.store.path().exists());
        assert_eq!(app.get_last_action().0.as_deref(), Some("reset-denied"));
    }

    #[test]
    fn correct_secret_resets_and_deletes() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);
        app.start_timer("01:00:00").unwrap();

        let snap = app.reset_timer("hunter2").unwrap();
        assert_eq!(snap.phase, TimerPhase::Idle);
        assert!(!app.store.path().exists());
    }

    #[test]
    fn restart_resumes_from_disk() {
        let dir = tempdir().unwrap();

        {
            let app = app_in(&dir);
            app.start_timer("00:30:00").unwrap();
        }

        // fresh process, same store path
        let app = app_in(&dir);
        let snap = app.resume_from_store().unwrap().unwrap();
        assert_eq!(snap.phase, TimerPhase::Running);
        assert!(snap.remaining_seconds <= 30 * 60);
        assert!(snap.remaining_seconds >= 30 * 60 - 2);
    }

    #[test]
    fn nothing_to_resume_on_empty_store() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);
        assert!(app.resume_from_store().unwrap().is_none());
    }

    #[test]
    fn tick_on_idle_is_a_no_op() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);

        let (snap, expired) = app.tick().unwrap();
        assert_eq!(snap.phase, TimerPhase::Idle);
        assert!(!expired);
        assert!(!app.store.path().exists());
    }

    #[test]
    fn persist_current_removes_file_when_idle() {
        let dir = tempdir().unwrap();
        let app = app_in(&dir);
        app.start_timer("00:05:00").unwrap();
        app.reset_timer("hunter2").unwrap();

        app.persist_current().unwrap();
        assert!(!app.store.path().exists());
    }
}
