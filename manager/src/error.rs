//! Session errors

use crate::environment::EnvironmentError;
use thiserror::Error;
use vault_model::ManageVaultStage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("environment feed failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("session is closed")]
    Closed,

    #[error("no initial value from the {0} feed")]
    MissingInitial(&'static str),

    #[error("timed out waiting for stage {0}")]
    StageTimeout(ManageVaultStage),
}
