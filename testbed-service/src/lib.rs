// Testbed Service Library
// Orchestration core for the firmware security testbed

pub mod compose;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod events;
pub mod executor;
pub mod fetch;
pub mod firmware;
pub mod images;
pub mod pipeline;
pub mod registry;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{TestbedError, TestbedResult};

pub use compose::ComposeCommand;
pub use config::{ComposeConfig, ComposeProgram, ConfigError, FirmwareConfig, TestbedConfig};
pub use engine::{BuildContext, BuildContextSpec, ContainerEngine, EngineError};
pub use environment::{EnvironmentController, EnvironmentError, EnvironmentOp, LogsOptions};
pub use events::{progress_channel, LogLevel, PipelineEvent, ProgressReceiver, ProgressSender};
pub use executor::{
    cancel_channel, CancelHandle, CancelSignal, ExecError, ExecOutput, Executor, Invocation,
    OutputMode, ProcessExecutor,
};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use firmware::{FirmwareError, FirmwareOutcome, FirmwareProvisioner, FirmwareSource};
pub use images::{BuildTarget, ImageBuild, ImageBuilder, ImageError};
pub use pipeline::{PipelineError, PipelineReport, PipelineRunner, Stage, StageResult};
pub use registry::Testbed;
pub use workspace::{resolve_workspace_root, ProvisionError, WorkspaceLayout};
