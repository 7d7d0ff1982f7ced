//! Spawn-spec loading and validation
//!
//! This module parses a TOML description of a child process into a
//! [`SpawnSpec`], applies sane defaults (via serde defaults), and performs
//! strict validation with field-path error messages. A validated spec is fed
//! to [`ProcessHandle::spawn_spec`](crate::process::ProcessHandle::spawn_spec).

use crate::{CoreError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// How one of the child's standard streams is wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// Connect the stream to a pipe owned by the caller
    #[default]
    Piped,
    /// Connect the stream to the null device
    Null,
    /// Let the child share the parent's stream
    Inherit,
}

/// Per-stream stdio wiring for a spawn.
///
/// Defaults to all three streams piped. Streams configured as `Null` or
/// `Inherit` allocate no pipe and produce no stream handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StdioConfig {
    /// Wiring for the child's stdin
    pub stdin: StdioMode,
    /// Wiring for the child's stdout
    pub stdout: StdioMode,
    /// Wiring for the child's stderr
    pub stderr: StdioMode,
}

/// Declarative description of one child process to launch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnSpec {
    /// Program to execute; the launcher also uses it as argv[0]
    pub command: String,
    /// Arguments for the program (argv[1..])
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides for the child
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Stdio wiring; all streams piped when omitted
    #[serde(default)]
    pub stdio: StdioConfig,
    /// Working directory for the child; inherits the parent's when omitted
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl SpawnSpec {
    /// Create a spec for the given program with default wiring.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            stdio: StdioConfig::default(),
            working_dir: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the stdio wiring.
    pub fn stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = stdio;
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Validate the spec and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "command: cannot be empty".to_string(),
            ));
        }
        if self.command.contains('\0') {
            return Err(CoreError::ValidationError(
                "command: must not contain NUL bytes".to_string(),
            ));
        }

        for (i, arg) in self.args.iter().enumerate() {
            if arg.contains('\0') {
                return Err(CoreError::ValidationError(format!(
                    "args[{}]: must not contain NUL bytes",
                    i
                )));
            }
        }

        for (key, value) in &self.env {
            if key.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "env: keys cannot be empty".to_string(),
                ));
            }
            if key.contains('=') || key.contains('\0') {
                return Err(CoreError::ValidationError(format!(
                    "env['{}']: keys must not contain '=' or NUL bytes",
                    key
                )));
            }
            if value.contains('\0') {
                return Err(CoreError::ValidationError(format!(
                    "env['{}']: value must not contain NUL bytes",
                    key
                )));
            }
        }

        if let Some(dir) = &self.working_dir {
            if dir.as_os_str().is_empty() {
                return Err(CoreError::ValidationError(
                    "workingDir: cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Load a spawn spec from a TOML file path
pub fn load_spec_from_toml_path(path: impl AsRef<Path>) -> Result<SpawnSpec> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read spec {:?}: {}", path.as_ref(), e))
    })?;
    load_spec_from_toml_str(&data)
}

/// Load a spawn spec from a TOML string
pub fn load_spec_from_toml_str(input: &str) -> Result<SpawnSpec> {
    let spec: SpawnSpec = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    spec.validate()?;
    Ok(spec)
}
