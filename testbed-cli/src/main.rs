// Testbed CLI
// Entry point for firmware, image, environment and CI commands

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use testbed_service::{cancel_channel, resolve_workspace_root, Testbed, TestbedConfig};

use commands::ci::CiCommand;
use commands::env::EnvCommand;
use commands::firmware::FirmwareCommand;
use commands::image::ImageCommand;

/// Build and run the firmware security testbed
#[derive(Parser, Debug)]
#[command(name = "testbed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace root (default: nearest directory with testbed.yaml or .git)
    #[arg(long, short = 'w', global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Config file (default: <workspace>/testbed.yaml when present)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Coreboot firmware
    Firmware {
        #[command(subcommand)]
        action: FirmwareCommand,
    },

    /// Host and BMC container images
    Image {
        #[command(subcommand)]
        action: ImageCommand,
    },

    /// Deployed environment lifecycle
    Env {
        #[command(subcommand)]
        action: EnvCommand,
    },

    /// CI pipeline
    Ci {
        #[command(subcommand)]
        action: CiCommand,
    },
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = match cli.workspace {
        Some(dir) => dir,
        None => resolve_workspace_root(),
    };
    let config = TestbedConfig::discover(&root, cli.config.as_deref())?;
    let testbed = Testbed::for_workspace(&root, config)?;

    // Ctrl-C stops the running command and its children
    let (cancel_handle, cancel) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            let _ = cancel_handle.send(true);
        }
    });

    match cli.command {
        Commands::Firmware { action } => {
            commands::firmware::execute(action, &testbed, &cancel).await
        }
        Commands::Image { action } => commands::image::execute(action, &testbed, &cancel).await,
        Commands::Env { action } => commands::env::execute(action, &testbed, &cancel).await,
        Commands::Ci { action } => commands::ci::execute(action, &testbed, &cancel).await,
    }
}
