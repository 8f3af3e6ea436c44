//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "cooking-timers")]
#[command(about = "Local timer engine for recipe steps that survives reloads and restarts")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding persisted timers
    #[arg(long, default_value = ".cooking-timers")]
    pub data_dir: PathBuf,

    /// Keep timers in memory only
    #[arg(long)]
    pub memory_only: bool,

    /// Minutes between stale-timer sweeps
    #[arg(long, default_value = "60")]
    pub sweep_interval: u64,

    /// Deliver completion notifications through notify-send
    #[arg(long)]
    pub desktop_notifications: bool,

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
        if self.verbose { "debug" } else { "info" }
    }

    pub fn sweep_every(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1) * 60)
    }
}
