// Pipeline Events
// Progress reporting for the CI pipeline

use std::time::Duration;

use tokio::sync::mpsc;

use crate::firmware::FirmwareSource;
use crate::pipeline::Stage;

/// Sender for pipeline progress events
pub type ProgressSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver for pipeline progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Log level for `PipelineEvent::Log`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

/// Events emitted while a pipeline runs
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_name: String,
        total_stages: usize,
    },

    PipelineCompleted {
        pipeline_name: String,
        success: bool,
        duration: Duration,
    },

    StageStarted {
        stage: Stage,
        stage_index: usize,
    },

    StageCompleted {
        stage: Stage,
        duration: Duration,
    },

    /// The stage failed and the pipeline stops here
    StageFailed {
        stage: Stage,
        message: String,
        duration: Duration,
    },

    /// Firmware was produced, and from which source
    FirmwareAcquired { source: FirmwareSource },

    Log { level: LogLevel, message: String },
}

/// Send an event if a channel is attached. A closed receiver is ignored.
pub(crate) fn emit(progress: Option<&ProgressSender>, event: PipelineEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}
