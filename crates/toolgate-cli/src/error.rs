//! CLI error type and exit codes.

use thiserror::Error;
use toolgate_core::{ExecutionError, SettingsError};
use toolgate_mcp::{GatewayError, RegistryError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl CliError {
    /// Exit code following sysexits.h where one fits.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Arguments(_) => 64, // EX_USAGE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Gateway(_) => 69,   // EX_UNAVAILABLE
            Self::Execution(_) => 1,
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<RegistryError> for CliError {
    fn from(err: RegistryError) -> Self {
        Self::Config(err.to_string())
    }
}
