use crate::output;

use std::time::Duration;

use clap::Subcommand;
use color_eyre::Result;

use testbed_service::{progress_channel, CancelSignal, LogLevel, PipelineEvent, Stage, Testbed};

#[derive(Subcommand, Debug)]
pub enum CiCommand {
    /// Provision, build and verify firmware
    Run {
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

pub async fn execute(
    command: CiCommand,
    testbed: &Testbed,
    cancel: &CancelSignal,
) -> Result<()> {
    match command {
        CiCommand::Run { json } => run(testbed, cancel, json).await,
    }
}

async fn run(testbed: &Testbed, cancel: &CancelSignal, json: bool) -> Result<()> {
    let (tx, mut rx) = progress_channel();
    let runner = testbed.pipeline().with_progress(tx);

    // Run in the background and render progress in the foreground
    let signal = cancel.clone();
    let handle = tokio::spawn(async move { runner.run(&signal).await });

    let mut total_stages = 0;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::PipelineStarted {
                pipeline_name,
                total_stages: total,
            } => {
                total_stages = total;
                output::header(&format!("Pipeline '{}' ({} stages)", pipeline_name, total));
            }

            PipelineEvent::PipelineCompleted {
                success, duration, ..
            } => {
                if success {
                    output::dim_success(&format!("  Finished in {:.2}s", duration.as_secs_f64()));
                } else {
                    output::failure(&format!(
                        "Pipeline failed after {:.2}s",
                        duration.as_secs_f64()
                    ));
                }
            }

            PipelineEvent::StageStarted { stage, stage_index } => {
                output::stage_header(
                    stage_index + 1,
                    total_stages,
                    &stage.to_string(),
                    stage.description(),
                );
            }

            PipelineEvent::StageCompleted { stage, duration } => {
                output::dim_success(&stage_result_line(stage, true, duration));
            }

            PipelineEvent::StageFailed {
                stage,
                message,
                duration,
            } => {
                // The error itself is reported once, when the command returns
                output::dim_failure(&stage_result_line(stage, false, duration));
                tracing::debug!(%stage, error = %message, "stage failed");
            }

            PipelineEvent::FirmwareAcquired { source } => {
                output::dim(&format!("    firmware: {}", source));
            }

            PipelineEvent::Log { level, message } => match level {
                LogLevel::Warning => output::warning(&message),
                LogLevel::Info => output::info(&message),
            },
        }
    }

    let report = handle.await??;

    if json {
        println!("{}", report.to_json()?);
    } else {
        output::success(&report.message);
    }
    Ok(())
}

fn stage_result_line(stage: Stage, passed: bool, duration: Duration) -> String {
    format!(
        "  Stage '{}' {} ({:.2}s)",
        stage,
        if passed { "OK" } else { "FAIL" },
        duration.as_secs_f64()
    )
}
