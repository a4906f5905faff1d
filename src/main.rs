use anyhow::{Context, Result};
use clap::Parser;
use facecue::cli::{Cli, Commands, ConfigAction};
use facecue::config::Config;
use facecue::replay::{ReplayOptions, parse_script, run_replay};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    facecue::logging::init(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Replay {
            script,
            backend,
            webhook,
            stdout,
            tick,
            pace,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(url) = webhook {
                config.delivery.webhook_url = Some(url);
            }
            if let Some(tick) = tick {
                config.delivery.tick_ms = tick.as_millis() as u64;
            }
            config.validate()?;

            let text = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script {}", script.display()))?;
            let options = ReplayOptions {
                script: parse_script(&text),
                backend,
                pace,
                to_stdout: stdout,
            };

            let summary = run_replay(config, options).await?;

            if !cli.quiet {
                match summary.final_delivery {
                    Some(outcome) => eprintln!("Final delivery: {:?}", outcome),
                    None => eprintln!("Final delivery: nothing to send"),
                }
                eprintln!("Undelivered events: {}", summary.status.buffered_events);
                for (label, total) in summary.status.totals.iter() {
                    eprintln!("  {:<10} {:.1}", label, total);
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => {
                println!("{}", Config::default_path()?.display());
            }
            ConfigAction::Dump => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path()?)?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}
