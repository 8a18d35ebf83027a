use addon_common::error::AddonError;
use addon_operator::error::AddonOperatorError;
use thiserror::Error;

pub type AddonCliResult<T = (), E = AddonCliError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum AddonCliError {
    #[error("Unable to initialize config: {0}")]
    InitConfig(String),
    #[error("Unable to run command: {0}")]
    Command(#[from] clap::error::Error),
    #[error("Unable to render CRD: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("Operator error: {0}")]
    Operator(#[from] AddonOperatorError),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<AddonError> for AddonCliError {
    fn from(error: AddonError) -> Self {
        AddonCliError::InitConfig(error.to_string())
    }
}

impl From<anyhow::Error> for AddonCliError {
    fn from(error: anyhow::Error) -> Self {
        AddonCliError::Runtime(error.to_string())
    }
}
