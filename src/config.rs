//! Configuration and CLI argument handling

use std::path::PathBuf;

use clap::Parser;

use crate::store::StateStore;

/// CLI argument parsing structure
#[derive(Parser)]
#[command(name = "curfew")]
#[command(about = "A countdown daemon that locks the workstation session when time runs out")]
#[command(version)]
pub struct Config {
    /// Port to bind the control API to
    #[arg(short, long, default_value = "20747")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Shared secret gating the reset endpoint
    #[arg(long, default_value = "curfew")]
    pub secret: String,

    /// Override the persisted-state file location
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Build the persisted-state adapter at the configured or default path
    pub fn state_store(&self) -> StateStore {
        let path = self
            .state_file
            .clone()
            .unwrap_or_else(StateStore::default_path);
        StateStore::new(path)
    }
}
