use gridharvest_core::{AuthError, HarvestError, JobError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<HarvestError> for CliError {
    fn from(error: HarvestError) -> Self {
        match error {
            HarvestError::Auth(error) => Self::Auth(error),
            HarvestError::Validation(error) => Self::Validation(error),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Job(JobError::Io { .. }) => 10,
            Self::Job(_) => 2,
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Auth(_) => 4,
            Self::Serialization(_) => 5,
            Self::Io(_) => 10,
        }
    }
}
