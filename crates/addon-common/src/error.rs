pub type AddonResult<T = (), E = AddonError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AddonError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}
