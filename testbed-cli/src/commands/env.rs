use crate::output;

use clap::Subcommand;
use color_eyre::Result;

use testbed_service::{CancelSignal, LogsOptions, Testbed};

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Start the environment in the background
    Up,

    /// Stop and remove the environment
    Down,

    /// Show service logs
    Logs {
        /// Keep streaming new output
        #[arg(long, short = 'f')]
        follow: bool,

        /// Only these services
        services: Vec<String>,
    },

    /// Show service status
    Status,
}

pub async fn execute(
    command: EnvCommand,
    testbed: &Testbed,
    cancel: &CancelSignal,
) -> Result<()> {
    let environment = testbed.environment();
    let message = match command {
        EnvCommand::Up => environment.up(cancel).await?,
        EnvCommand::Down => environment.down(cancel).await?,
        EnvCommand::Logs { follow, services } => {
            let options = LogsOptions { follow, services };
            environment.logs(&options, cancel).await?
        }
        EnvCommand::Status => environment.status(cancel).await?,
    };

    output::success(&message);
    Ok(())
}
