// Component Registry
// Wires the four orchestration components to one workspace, executor and fetcher

use std::path::Path;
use std::sync::Arc;

use crate::compose::ComposeCommand;
use crate::config::TestbedConfig;
use crate::engine::ContainerEngine;
use crate::environment::EnvironmentController;
use crate::error::TestbedResult;
use crate::executor::{Executor, ProcessExecutor};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::firmware::FirmwareProvisioner;
use crate::images::ImageBuilder;
use crate::pipeline::PipelineRunner;
use crate::workspace::WorkspaceLayout;

/// Shared dependencies for building components
#[derive(Clone)]
pub struct Testbed {
    layout: WorkspaceLayout,
    config: TestbedConfig,
    executor: Arc<dyn Executor>,
    fetcher: Arc<dyn Fetcher>,
}

impl Testbed {
    pub fn new(
        layout: WorkspaceLayout,
        config: TestbedConfig,
        executor: Arc<dyn Executor>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            layout,
            config,
            executor,
            fetcher,
        }
    }

    /// Real processes and HTTP, rooted at `root`
    pub fn for_workspace(root: &Path, config: TestbedConfig) -> TestbedResult<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(config.firmware.fetch_timeout())?;
        Ok(Self::new(
            WorkspaceLayout::new(root),
            config,
            Arc::new(ProcessExecutor::new()),
            Arc::new(fetcher),
        ))
    }

    fn compose(&self) -> ComposeCommand {
        ComposeCommand::resolve(
            &self.config.compose,
            &self.config.docker_program,
            self.layout.root(),
        )
    }

    pub fn firmware(&self) -> FirmwareProvisioner {
        FirmwareProvisioner::new(
            ContainerEngine::new(self.executor.clone(), self.config.docker_program.clone()),
            self.fetcher.clone(),
            self.layout.clone(),
            self.config.firmware.clone(),
        )
    }

    pub fn images(&self) -> ImageBuilder {
        ImageBuilder::new(self.executor.clone(), self.compose(), self.firmware())
    }

    pub fn environment(&self) -> EnvironmentController {
        EnvironmentController::new(self.executor.clone(), self.compose())
    }

    pub fn pipeline(&self) -> PipelineRunner {
        PipelineRunner::new(self.layout.clone(), self.firmware())
    }
}
