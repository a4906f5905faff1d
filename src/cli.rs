//! Command-line interface for facecue
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Facial expression events for conference webhooks
#[derive(Parser, Debug)]
#[command(
    name = "facecue",
    version,
    about = "Facial expression events for conference webhooks"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a label script through the pipeline and deliver the result
    Replay {
        /// Script file: one label per line, blank line for "no face", '#' for comments
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Backend the scripted worker reports (webgl, cpu, ...)
        #[arg(long, value_name = "BACKEND", default_value = "webgl")]
        backend: String,

        /// Webhook base URL override (events are posted to <URL>/emotions)
        #[arg(long, value_name = "URL")]
        webhook: Option<String>,

        /// Print batches as JSON lines instead of posting them
        #[arg(long)]
        stdout: bool,

        /// Delivery tick override. Examples: 500ms, 15s, 1m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        tick: Option<Duration>,

        /// Delay before each classification. Examples: 0, 100ms, 1s
        #[arg(long, value_name = "DURATION", default_value = "0", value_parser = parse_duration)]
        pace: Duration,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the default configuration file location
    Path,
    /// Print the effective configuration as TOML
    Dump,
}

/// Parse a duration string.
///
/// Bare numbers are milliseconds; anything else goes through `humantime`
/// (`500ms`, `15s`, `1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}
