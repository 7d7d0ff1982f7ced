//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Process already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("Process spawn failed: {0}")]
    ProcessSpawn(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "PROC001",
            CoreError::ResourceExhausted(_) => "PROC002",
            CoreError::AlreadyRunning(_) => "PROC003",
            CoreError::ProcessSpawn(_) => "PROC004",
            CoreError::ConfigurationError(_) => "PROC005",
            CoreError::ValidationError(_) => "PROC006",
            CoreError::InitializationError(_) => "PROC007",
            CoreError::IoError(_) => "PROC008",
            CoreError::Other(_) => "PROC999",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

// Convenience implementations
impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}
