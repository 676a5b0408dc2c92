//! Error — the orchestrator-wide error enum, mirroring the teacher's
//! `ApiError` (`crates/cluster/src/error.rs`): named variants, `#[from]`
//! conversions for wrapped library errors, and a mapping to
//! gRPC-equivalent status codes.

use thiserror::Error;

use crate::container::ContainerError;

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Duplicate(String),

    #[error("port pool exhausted")]
    Exhausted,

    #[error("container create failed: {0}")]
    CreateFailed(String),

    #[error("failed to persist network state: {0}")]
    PersistFailed(String),

    #[error("network is still online")]
    StillOnline,

    #[error("container runtime error: {0}")]
    Container(#[from] ContainerError),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type NexusResult<T> = Result<T, NexusError>;

/// gRPC-equivalent status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Internal,
}

impl NexusError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            NexusError::Invalid(_) => StatusCode::InvalidArgument,
            NexusError::NotFound(_) => StatusCode::NotFound,
            NexusError::Duplicate(_) => StatusCode::AlreadyExists,
            _ => StatusCode::Internal,
        }
    }
}
