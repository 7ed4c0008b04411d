//! crates/dictation_core/src/error.rs
//!
//! Errors returned by the correction and session operations.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The submission was rejected before alignment.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// The operation is not valid in the session's current state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<PortError> for CoreError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => CoreError::ItemNotFound(what),
            PortError::Unavailable(msg) | PortError::Unexpected(msg) => {
                CoreError::StoreUnavailable(msg)
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
