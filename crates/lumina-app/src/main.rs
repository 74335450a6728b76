//! # Lumina
//!
//! Envelope-driven light show executor. Reads operator commands from stdin,
//! one per line, and drives the show's actuators over UDP.

mod control;
mod show;

use std::path::PathBuf;

use anyhow::{Context, Result};
use control::ControlCommand;
use lumina_core::Config;
use show::{Reply, Show};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lumina=info,lumina_core=info,lumina_engine=info,lumina_devices=info,lumina_status=info".into()
            }),
        )
        .init();

    info!("Starting Lumina v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::resolve(config_path.as_deref()).context("Failed to load configuration")?;
    let show = Show::start(config).context("Failed to start show")?;
    let observer = show.spawn_status_observer();

    let result = run_control_loop(&show).await;

    // Always leave the actuators dark, even when the loop failed
    show.shutdown().context("Failed to shut down executor")?;
    observer.abort();
    info!("Lumina stopped");
    result
}

/// Read commands until `quit`, end of input or Ctrl-C.
async fn run_control_loop(show: &Show) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("End of input");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                if handle_line(show, &line) == Reply::Quit {
                    return Ok(());
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

fn handle_line(show: &Show, line: &str) -> Reply {
    let outcome = line
        .parse::<ControlCommand>()
        .and_then(|command| show.execute(command));

    match outcome {
        Ok(Reply::Text(text)) => {
            println!("{text}");
            Reply::Done
        }
        Ok(reply) => reply,
        Err(e) if e.is_user_facing() => {
            println!("rejected: {e}");
            Reply::Done
        }
        Err(e) => {
            warn!("Command {line:?} failed: {e}");
            println!("error: {e}");
            Reply::Done
        }
    }
}
