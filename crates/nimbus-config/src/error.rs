use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Configuration file not found. Looked in:\n\
        - current directory: nimbus.local.kdl, .nimbus.local.kdl, nimbus.kdl, .nimbus.kdl\n\
        - ./.nimbus/ directory\n\
        - ~/.config/nimbus/nimbus.kdl\n\
        Set NIMBUS_CONFIG to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("NIMBUS_CONFIG points at a missing file: {0}")]
    ExplicitPathMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
