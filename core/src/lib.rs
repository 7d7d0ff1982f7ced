//! Core functionality for the subproc project
//!
//! This crate is an asynchronous child-process launcher: it spawns a
//! subprocess with its standard streams wired to caller-owned pipes, answers
//! non-blocking status polls, and tears down idempotently. The heart of the
//! crate is [`process::ProcessHandle`]; [`config::SpawnSpec`] describes a
//! launch declaratively and can be loaded from TOML.

pub mod config;
pub mod error;
#[cfg(unix)]
pub mod pipe;
#[cfg(unix)]
pub mod process;

pub use config::{
    load_spec_from_toml_path, load_spec_from_toml_str, SpawnSpec, StdioConfig, StdioMode,
};
pub use error::{CoreError, Result};
#[cfg(unix)]
pub use process::{ProcessHandle, STATUS_NOT_RUNNING, STATUS_RUNNING};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
