//! Errors surfaced by the container adapter, mirroring the teacher's
//! `docker::client::DockerError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("docker daemon error: {0}")]
    Daemon(#[from] bollard::errors::Error),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container labels missing or malformed for {0}")]
    BadLabels(String),

    #[error("container never became ready: {0}")]
    NotReady(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
