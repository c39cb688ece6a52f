use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("Invalid resource reference '{0}' (expected <kind>/<name>)")]
    InvalidReference(String),

    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("Resource '{resource}' depends on '{dependency}', which is not part of the topology")]
    UnknownDependency { resource: String, dependency: String },

    #[error(
        "SSH public key not found: {path}\nHint: set vm {{ ssh-public-key \"...\" }} or NIMBUS_SSH_PUBLIC_KEY"
    )]
    SshKeyNotFound { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, TopologyError>;
