use crate::output;

use clap::Subcommand;
use color_eyre::Result;

use testbed_service::{CancelSignal, Testbed};

#[derive(Subcommand, Debug)]
pub enum FirmwareCommand {
    /// Build the coreboot ROM into firmware/coreboot.rom
    Build,
}

pub async fn execute(
    command: FirmwareCommand,
    testbed: &Testbed,
    cancel: &CancelSignal,
) -> Result<()> {
    match command {
        FirmwareCommand::Build => {
            output::status("Building", "coreboot firmware");
            let outcome = testbed.firmware().acquire(cancel).await?;

            if outcome.source.is_placeholder() {
                output::warning(&format!("Using {}", outcome.source));
            } else {
                output::dim(&format!("  {}", outcome.source));
            }
            output::success(&outcome.message());
            Ok(())
        }
    }
}
