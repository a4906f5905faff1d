//! Logging setup for the `facecue` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's decision.

use tracing::Level;

/// Map `-q` / `-v` flags to a maximum log level.
pub fn level_for(quiet: bool, verbosity: u8) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install a stderr fmt subscriber. Safe to call more than once.
pub fn init(quiet: bool, verbosity: u8) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_max_level(level_for(quiet, verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .try_init()
    {
        tracing::debug!("subscriber already installed: {}", e);
    }
}
