use crate::config::{ConfigError, ConfigErrors};
use crate::pipeline::PipelineError;
use crate::secrets::SecretError;

/// Failure to build a unit; nothing of the unit is produced
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("Invalid configuration")]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Field(#[from] ConfigError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("Invalid resource composition")]
    Pipeline(#[from] PipelineError),
}

impl BuildError {
    /// Every configuration problem carried by this error
    pub fn config_issues(&self) -> Vec<&ConfigError> {
        match self {
            BuildError::Config(errors) => errors.issues().iter().collect(),
            BuildError::Field(error) => vec![error],
            _ => vec![],
        }
    }
}
