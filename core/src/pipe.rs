//! Pipe-pair allocation for child stdio wiring
//!
//! A [`PipePair`] is one unidirectional OS pipe held as two move-only
//! [`OwnedFd`] ends. Ownership tracking replaces manual descriptor
//! bookkeeping: releasing an end is dropping it, and transferring an end is
//! moving it, so a descriptor can never be closed twice or used after close.
//!
//! All pipes are created with `O_CLOEXEC` on both ends. The spawn path binds
//! the child-side ends through `std::process::Stdio`, whose dup2 onto fds
//! 0/1/2 clears the flag for exactly the three descriptors the child is meant
//! to inherit; every other end stays close-on-exec.

// Allow unsafe code for this module: O_NONBLOCK is set with a raw fcntl call
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::debug;

/// One unidirectional pipe: a read end and a write end.
///
/// Both ends are owned; dropping a `PipePair` closes whichever ends have not
/// been moved out.
#[derive(Debug)]
pub struct PipePair {
    /// Read end of the pipe
    pub read: OwnedFd,
    /// Write end of the pipe
    pub write: OwnedFd,
}

/// Create a pipe pair with `O_CLOEXEC` set on both ends.
///
/// Returns `CoreError::ResourceExhausted` when the process or system
/// descriptor limit is reached (`EMFILE`/`ENFILE`).
pub fn allocate_pipe() -> Result<PipePair> {
    match pipe2(OFlag::O_CLOEXEC) {
        Ok((read, write)) => {
            debug!(
                read = read.as_raw_fd(),
                write = write.as_raw_fd(),
                "allocated pipe pair"
            );
            Ok(PipePair { read, write })
        }
        Err(errno @ (Errno::EMFILE | Errno::ENFILE)) => Err(CoreError::ResourceExhausted(
            format!("cannot create pipe: {}", errno),
        )),
        Err(errno) => Err(CoreError::IoError(std::io::Error::from(errno))),
    }
}

/// The three pipe pairs backing a child's standard streams.
///
/// Allocation is all-or-nothing: if a later pair fails to allocate, the
/// earlier pairs are released before the error propagates (their `OwnedFd`
/// ends drop), so a partial allocation never leaks descriptors.
#[derive(Debug)]
pub struct StdioPipes {
    /// Parent writes the child's stdin through this pair
    pub stdin: PipePair,
    /// Parent reads the child's stdout through this pair
    pub stdout: PipePair,
    /// Parent reads the child's stderr through this pair
    pub stderr: PipePair,
}

impl StdioPipes {
    /// Allocate the stdin, stdout, and stderr pairs.
    pub fn allocate() -> Result<StdioPipes> {
        Ok(StdioPipes {
            stdin: allocate_pipe()?,
            stdout: allocate_pipe()?,
            stderr: allocate_pipe()?,
        })
    }
}

/// Switch a descriptor to non-blocking mode.
///
/// The parent-side pipe ends are handed to the tokio pipe reactor, which
/// requires non-blocking descriptors.
pub(crate) fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    let raw = fd.as_raw_fd();
    // Safety: `raw` comes from an OwnedFd that outlives both calls.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags == -1 {
        return Err(CoreError::IoError(std::io::Error::last_os_error()));
    }
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc == -1 {
        return Err(CoreError::IoError(std::io::Error::last_os_error()));
    }
    Ok(())
}
