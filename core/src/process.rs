//! Child-process launch and lifecycle management
//!
//! [`ProcessHandle`] owns one logical subprocess at a time. A spawn allocates
//! the stdio pipe pairs, launches the child with the child-side ends bound to
//! its standard streams, and wraps the parent-side ends into async stream
//! handles attached to the handle. The caller then polls exit status without
//! blocking and tears the handle down with [`ProcessHandle::close`], which is
//! safe to call any number of times and from any state.
//!
//! ## Call discipline
//!
//! All operations take `&mut self`: a handle is not meant to be shared across
//! tasks, and concurrent spawn/status/close on the same handle is ruled out
//! at compile time rather than guarded by a lock.
//!
//! Spawning requires a running tokio runtime (the child and the pipe ends are
//! registered with the reactor). Status polling and close work from any
//! context once a child exists.
//!
//! ## Termination
//!
//! Closing the handle does not signal the child. A still-running child keeps
//! running after `close()`; the runtime reaps it when it eventually exits.
//! Delivering signals is the caller's concern.

use crate::config::{SpawnSpec, StdioConfig, StdioMode};
use crate::pipe::{self, PipePair};
use crate::{CoreError, Result};
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::net::unix::pipe::{Receiver, Sender};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// `status()` value while the child is still running.
pub const STATUS_RUNNING: i32 = 256;

/// `status()` value when the handle has no process recorded.
pub const STATUS_NOT_RUNNING: i32 = -1;

/// Handle for one logical subprocess: spawn, poll, close.
///
/// A fresh handle is empty. A successful spawn records the child and attaches
/// up to three stream handles; `close()` (or drop) releases everything and
/// returns the handle to its empty state, ready for another spawn.
#[derive(Debug, Default)]
pub struct ProcessHandle {
    /// The spawned child; `None` is the "no process" sentinel
    child: Option<Child>,
    /// argv[1..] of the current spawn; cleared on close
    argument_table: Vec<String>,
    /// Environment overrides of the current spawn; cleared on close
    environment_table: HashMap<String, String>,
    /// Write side of the child's stdin, until taken by the caller
    stdin: Option<Sender>,
    /// Read side of the child's stdout, until taken by the caller
    stdout: Option<Receiver>,
    /// Read side of the child's stderr, until taken by the caller
    stderr: Option<Receiver>,
}

impl ProcessHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// OS pid of the spawned child, if one is recorded and still unreaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// argv[1..] of the current spawn.
    pub fn argument_table(&self) -> &[String] {
        &self.argument_table
    }

    /// Environment overrides of the current spawn.
    pub fn environment_table(&self) -> &HashMap<String, String> {
        &self.environment_table
    }

    /// Spawn `command` with all three standard streams piped.
    ///
    /// The launcher supplies `command` itself as argv[0]; `args` populate
    /// argv[1..]. `env` entries are applied in order with last-write-wins
    /// semantics for duplicate keys, matching standard environment behavior.
    ///
    /// Arguments are validated before any OS resource is touched; a handle
    /// that already has an open spawn fails with
    /// [`CoreError::AlreadyRunning`]; callers wanting replace semantics
    /// close first. On any failure the handle stays empty and every
    /// descriptor allocated by the attempt is released.
    ///
    /// Returns the child's pid. The stream handles are attached to the
    /// handle; transfer them out with [`take_stdin`](Self::take_stdin),
    /// [`take_stdout`](Self::take_stdout), [`take_stderr`](Self::take_stderr).
    pub fn try_spawn(
        &mut self,
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<u32> {
        self.ensure_idle()?;
        validate_spawn_input(command, args, env)?;

        // Tables are rebuilt fresh for this attempt.
        self.argument_table.clear();
        self.argument_table.extend(args.iter().cloned());
        self.environment_table.clear();
        for (key, value) in env {
            // last write wins
            self.environment_table.insert(key.clone(), value.clone());
        }

        self.launch(command, StdioConfig::default(), None)
    }

    /// Spawn from a validated [`SpawnSpec`] (stdio modes, working directory).
    ///
    /// Streams configured as `Null` or `Inherit` allocate no pipe and leave
    /// the corresponding stream slot empty.
    pub fn spawn_spec(&mut self, spec: &SpawnSpec) -> Result<u32> {
        self.ensure_idle()?;
        spec.validate()?;

        self.argument_table = spec.args.clone();
        self.environment_table = spec.env.clone();

        self.launch(&spec.command, spec.stdio, spec.working_dir.as_deref())
    }

    /// Numeric-status boundary for [`try_spawn`](Self::try_spawn).
    ///
    /// Returns `0` on success and `-1` on any failure, logging the rich
    /// error. Long-running orchestration code checks the number instead of
    /// matching error types.
    pub fn spawn(&mut self, command: &str, args: &[String], env: &[(String, String)]) -> i32 {
        match self.try_spawn(command, args, env) {
            Ok(_) => 0,
            Err(err) => {
                warn!(code = err.code(), "spawn failed: {}", err);
                -1
            }
        }
    }

    /// Non-blocking liveness/exit poll.
    ///
    /// Returns [`STATUS_NOT_RUNNING`] when no process is recorded,
    /// [`STATUS_RUNNING`] while the child is alive, the exit code
    /// (`0..=255`) once it has exited, or `128 + signal` for a
    /// signal-terminated child. Polling reaps an exited child so it cannot
    /// linger as a zombie; after exit, repeated calls keep returning the same
    /// terminal value.
    pub fn status(&mut self) -> i32 {
        let Some(child) = self.child.as_mut() else {
            return STATUS_NOT_RUNNING;
        };
        match child.try_wait() {
            Ok(None) => STATUS_RUNNING,
            Ok(Some(exit)) => exit_to_status(exit),
            Err(err) => {
                warn!("status poll failed: {}", err);
                STATUS_NOT_RUNNING
            }
        }
    }

    /// Transfer ownership of the child's stdin writer to the caller.
    /// Returns `None` if stdin was not piped, already taken, or closed.
    pub fn take_stdin(&mut self) -> Option<Sender> {
        self.stdin.take()
    }

    /// Transfer ownership of the child's stdout reader to the caller.
    /// Returns `None` if stdout was not piped, already taken, or closed.
    pub fn take_stdout(&mut self) -> Option<Receiver> {
        self.stdout.take()
    }

    /// Transfer ownership of the child's stderr reader to the caller.
    /// Returns `None` if stderr was not piped, already taken, or closed.
    pub fn take_stderr(&mut self) -> Option<Receiver> {
        self.stderr.take()
    }

    /// Tear the handle down. Idempotent; a no-op when nothing was spawned.
    ///
    /// Reaps the child if it has already exited, releases any stream handles
    /// the caller never took, clears the argument and environment tables,
    /// and resets the process slot to the sentinel. Returns the handle for
    /// chaining; the handle is reusable for a new spawn afterwards.
    pub fn close(&mut self) -> &mut Self {
        let Some(mut child) = self.child.take() else {
            return self;
        };
        match child.try_wait() {
            Ok(Some(exit)) => debug!("reaped child on close: {}", exit),
            Ok(None) => debug!(pid = child.id(), "closing handle with child still running"),
            Err(err) => warn!("reap on close failed: {}", err),
        }
        // Untransferred parent-side descriptors are released here.
        self.stdin = None;
        self.stdout = None;
        self.stderr = None;
        self.argument_table.clear();
        self.environment_table.clear();
        self
    }

    fn ensure_idle(&self) -> Result<()> {
        if let Some(child) = &self.child {
            return Err(CoreError::AlreadyRunning(child.id().unwrap_or(0)));
        }
        Ok(())
    }

    /// Allocate pipes per the stdio config, spawn the child with the
    /// child-side ends bound to its standard streams, and attach the
    /// parent-side ends as stream handles.
    ///
    /// Uses the already-rebuilt argument and environment tables. Every
    /// descriptor created here lives in an owned handle, so each early
    /// return releases the whole attempt.
    fn launch(
        &mut self,
        command: &str,
        stdio: StdioConfig,
        working_dir: Option<&Path>,
    ) -> Result<u32> {
        let mut cmd = Command::new(command);
        cmd.args(&self.argument_table);
        for (key, value) in &self.environment_table {
            cmd.env(key, value);
        }
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        // The dup2 onto fds 0/1/2 inside spawn clears O_CLOEXEC for exactly
        // the three bound ends; unused ends stay close-on-exec and the
        // Command drops its copies of the child ends after the fork.
        let mut parent_stdin: Option<OwnedFd> = None;
        match stdio.stdin {
            StdioMode::Piped => {
                let PipePair { read, write } = pipe::allocate_pipe()?;
                cmd.stdin(Stdio::from(read));
                parent_stdin = Some(write);
            }
            StdioMode::Null => {
                cmd.stdin(Stdio::null());
            }
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit());
            }
        }
        let mut parent_stdout: Option<OwnedFd> = None;
        match stdio.stdout {
            StdioMode::Piped => {
                let PipePair { read, write } = pipe::allocate_pipe()?;
                cmd.stdout(Stdio::from(write));
                parent_stdout = Some(read);
            }
            StdioMode::Null => {
                cmd.stdout(Stdio::null());
            }
            StdioMode::Inherit => {
                cmd.stdout(Stdio::inherit());
            }
        }
        let mut parent_stderr: Option<OwnedFd> = None;
        match stdio.stderr {
            StdioMode::Piped => {
                let PipePair { read, write } = pipe::allocate_pipe()?;
                cmd.stderr(Stdio::from(write));
                parent_stderr = Some(read);
            }
            StdioMode::Null => {
                cmd.stderr(Stdio::null());
            }
            StdioMode::Inherit => {
                cmd.stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                // EAGAIN from fork: process limit reached
                CoreError::ResourceExhausted(format!("cannot spawn '{}': {}", command, e))
            } else {
                CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", command, e))
            }
        })?;

        let pid = child
            .id()
            .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;

        // Wrap all parent-side ends before committing anything, so a wrap
        // failure leaves no half-initialized handle behind.
        let streams = (|| -> Result<(Option<Sender>, Option<Receiver>, Option<Receiver>)> {
            let stdin = parent_stdin.map(wrap_sender).transpose()?;
            let stdout = parent_stdout.map(wrap_receiver).transpose()?;
            let stderr = parent_stderr.map(wrap_receiver).transpose()?;
            Ok((stdin, stdout, stderr))
        })();
        let (stdin, stdout, stderr) = match streams {
            Ok(streams) => streams,
            Err(err) => {
                // Unreachable in practice: the descriptors are fresh pipes.
                let _ = child.start_kill();
                return Err(err);
            }
        };

        debug!(pid, command, "spawned child process");
        self.child = Some(child);
        self.stdin = stdin;
        self.stdout = stdout;
        self.stderr = stderr;
        Ok(pid)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map an exit status to the numeric boundary value: the exit code when the
/// child exited, `128 + signal` when a signal terminated it.
fn exit_to_status(exit: ExitStatus) -> i32 {
    if let Some(code) = exit.code() {
        return code;
    }
    if let Some(signal) = exit.signal() {
        return 128 + signal;
    }
    STATUS_NOT_RUNNING
}

/// Check spawn input before any OS resource is allocated.
///
/// The command must be non-empty; command, args, env keys, and env values
/// must be free of interior NUL bytes (the exec boundary cannot represent
/// them); env keys must be non-empty and free of `=`.
fn validate_spawn_input(command: &str, args: &[String], env: &[(String, String)]) -> Result<()> {
    if command.is_empty() {
        return Err(CoreError::InvalidArgument(
            "command cannot be empty".to_string(),
        ));
    }
    if command.contains('\0') {
        return Err(CoreError::InvalidArgument(
            "command must not contain NUL bytes".to_string(),
        ));
    }
    for arg in args {
        if arg.contains('\0') {
            return Err(CoreError::InvalidArgument(
                "args must not contain NUL bytes".to_string(),
            ));
        }
    }
    for (key, value) in env {
        if key.is_empty() {
            return Err(CoreError::InvalidArgument(
                "env keys cannot be empty".to_string(),
            ));
        }
        if key.contains('=') || key.contains('\0') {
            return Err(CoreError::InvalidArgument(
                "env keys must not contain '=' or NUL bytes".to_string(),
            ));
        }
        if value.contains('\0') {
            return Err(CoreError::InvalidArgument(
                "env values must not contain NUL bytes".to_string(),
            ));
        }
    }
    Ok(())
}

fn wrap_sender(fd: OwnedFd) -> Result<Sender> {
    pipe::set_nonblocking(&fd)?;
    Sender::from_owned_fd(fd).map_err(CoreError::IoError)
}

fn wrap_receiver(fd: OwnedFd) -> Result<Receiver> {
    pipe::set_nonblocking(&fd)?;
    Receiver::from_owned_fd(fd).map_err(CoreError::IoError)
}
