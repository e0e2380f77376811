//! hpad: the autoscaler daemon.
//!
//! # Usage
//!
//! ```text
//! hpad validate --config hpa.toml
//! hpad simulate --config hpa.toml --trace load.toml [--data-dir /var/lib/hpa]
//! ```
//!
//! `simulate` drives the reconciler through a scripted trace and prints one
//! JSON line per autoscaler per tick, then the final status of each.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod trace;

#[derive(Parser)]
#[command(name = "hpad", about = "Horizontal autoscaler daemon", version)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every autoscaler in a config file.
    Validate {
        #[arg(short, long, default_value = "hpa.toml")]
        config: PathBuf,
    },
    /// Replay a metric trace through the controller.
    Simulate {
        #[arg(short, long, default_value = "hpa.toml")]
        config: PathBuf,

        /// Trace file with the metric steps to replay.
        #[arg(short, long)]
        trace: PathBuf,

        /// Persist state here instead of in memory. Overrides the config.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hpad=debug,hpa=debug".parse().unwrap());
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Validate { config } => commands::validate::validate(&config),
        Command::Simulate {
            config,
            trace,
            data_dir,
        } => commands::simulate::simulate(&config, &trace, data_dir).await,
    }
}
