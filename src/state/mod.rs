//! State management module
//!
//! This module contains the countdown state machine and the shared
//! application state that owns it.

pub mod app_state;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use timer_state::{TimerError, TimerPhase, TimerSnapshot, TimerState};
