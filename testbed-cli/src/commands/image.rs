use crate::output;

use clap::Subcommand;
use color_eyre::Result;

use testbed_service::{BuildTarget, CancelSignal, Testbed};

/// Lines of build output shown after a successful build
const LOG_TAIL_LINES: usize = 20;

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// Build container images (host, bmc or all)
    Build {
        /// Image to build; `all` builds firmware first
        #[arg(default_value = "all", value_name = "TARGET")]
        target: BuildTarget,
    },
}

pub async fn execute(
    command: ImageCommand,
    testbed: &Testbed,
    cancel: &CancelSignal,
) -> Result<()> {
    match command {
        ImageCommand::Build { target } => {
            output::status("Building", &format!("{} image", target));
            let build = testbed.images().build(target, cancel).await?;

            if let Some(firmware) = &build.firmware {
                output::success(&firmware.message());
            }
            let summary = log_summary(&build.log, LOG_TAIL_LINES);
            if !summary.is_empty() {
                output::dim("  Build output:");
                for line in &summary {
                    output::log_line(line);
                }
            }
            output::success(&build.message);
            Ok(())
        }
    }
}

/// The last `max_lines` non-blank lines of a build log, with a marker for the rest
fn log_summary(log: &str, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let skipped = lines.len().saturating_sub(max_lines);

    let mut summary = Vec::with_capacity(max_lines + 1);
    if skipped > 0 {
        summary.push(format!("... {} earlier lines (-v for the full log)", skipped));
    }
    summary.extend(lines[skipped..].iter().map(|l| l.to_string()));
    summary
}
