//! Persistence for the running countdown
//!
//! A small JSON record lets a restart reconstitute elapsed time from the
//! original start timestamp instead of starting over.

pub mod state_file;

// Re-export main types
pub use state_file::{PersistedState, StateStore, STATE_FILE_NAME};
