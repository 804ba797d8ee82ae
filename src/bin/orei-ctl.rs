//! `orei-ctl`: send commands to an HD-401MR from the shell.
//!
//! ```text
//! orei-ctl --host 192.168.1.50 send PWR1 SMD2
//! orei-ctl --config switcher.toml send OSD0
//! orei-ctl commands
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing_subscriber::EnvFilter;

use orei_control::{Command, CommandTable, Config, Controller, Status};

/// Poll period while waiting for the queue to drain.
const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "orei-ctl", version, about = "Control an OREI HD-401MR multi-viewer")]
struct Cli {
    /// Device IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Control port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// TOML file with `host` and `port`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send commands in order and wait until each is acknowledged or dropped
    Send {
        /// Commands such as PWR1 or SMD3
        #[arg(required = true)]
        commands: Vec<String>,

        /// Seconds to wait for the connection and for the queue to drain
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// List the known commands and their arguments
    Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "orei_control=debug,orei_ctl=debug"
    } else {
        "orei_control=info,orei_ctl=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .compact()
        .init();

    match &cli.command {
        Commands::Commands => {
            list_commands(CommandTable::standard());
            Ok(())
        }
        Commands::Send { commands, timeout } => {
            let config = load_config(&cli)?;
            send(config, commands, Duration::from_secs(*timeout)).await
        }
    }
}

/// Config file first, then command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::new(""),
    };
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate().context("invalid device address")?;
    Ok(config)
}

async fn send(config: Config, commands: &[String], limit: Duration) -> anyhow::Result<()> {
    let commands = commands
        .iter()
        .map(|c| Command::new(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    let (status_tx, mut statuses) = mpsc::unbounded_channel();
    let controller = Controller::builder()
        .config(config.clone())
        .on_status(move |status| {
            let _ = status_tx.send(status.clone());
        })
        .start();

    let connected = timeout(limit, async {
        while let Some(status) = statuses.recv().await {
            match status {
                Status::Connected => return Ok(()),
                Status::Error(message) => return Err(message),
                _ => {}
            }
        }
        Err("session stopped".to_string())
    })
    .await;

    match connected {
        Ok(Ok(())) => {}
        Ok(Err(message)) => {
            controller.shutdown().await;
            bail!("could not connect to {}: {}", config.address(), message);
        }
        Err(_) => {
            controller.shutdown().await;
            bail!("timed out connecting to {}", config.address());
        }
    }

    for command in commands {
        if !controller.enqueue_command(command.clone()) {
            controller.shutdown().await;
            bail!("connection lost before {} was queued", command);
        }
    }

    // Give the session a turn to pick the requests up before polling.
    let deadline = Instant::now() + limit;
    sleep(DRAIN_POLL).await;
    while controller.pending_commands() > 0 && controller.is_ready() {
        if Instant::now() >= deadline {
            tracing::warn!(
                "{} commands still pending after {:?}",
                controller.pending_commands(),
                limit
            );
            break;
        }
        sleep(DRAIN_POLL).await;
    }

    controller.shutdown().await;
    Ok(())
}

fn list_commands(table: &CommandTable) {
    for spec in table.iter() {
        let reply = if spec.produces_reply { "" } else { " (no reply)" };
        println!(
            "{:<5} {:<22} [{}]{}",
            spec.id, spec.label, spec.category, reply
        );
        for choice in spec.choices {
            println!("        {}{:<3} {}", spec.id, choice.id, choice.label);
        }
    }
}
