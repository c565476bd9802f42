// Service Errors
// Crate-wide error type wrapping each component's errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::environment::EnvironmentError;
use crate::fetch::FetchError;
use crate::firmware::FirmwareError;
use crate::images::ImageError;
use crate::pipeline::PipelineError;

pub type TestbedResult<T> = Result<T, TestbedError>;

#[derive(Debug, Error)]
pub enum TestbedError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
