//! Integration tests for child-process launch and lifecycle
//!
//! These tests verify that `ProcessHandle` correctly:
//! - Wires child stdio to caller-owned pipe streams
//! - Propagates environment overrides with last-write-wins semantics
//! - Polls exit status without blocking and stabilizes after exit
//! - Tears down idempotently without leaking descriptors

#![cfg(unix)]

use subproc_core::process::{ProcessHandle, STATUS_NOT_RUNNING, STATUS_RUNNING};
use subproc_core::{CoreError, SpawnSpec, StdioConfig, StdioMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, Duration};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Number of descriptors currently open in this process
fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .expect("/proc/self/fd should be readable")
        .count()
}

/// Poll until the handle reports a terminal status, without blocking
async fn poll_until_exit(handle: &mut ProcessHandle) -> i32 {
    let mut status = handle.status();
    for _ in 0..500 {
        if status != STATUS_RUNNING {
            return status;
        }
        sleep(Duration::from_millis(10)).await;
        status = handle.status();
    }
    panic!("child did not exit within the polling window");
}

/// Test that bytes written to the child's stdin come back on its stdout
#[tokio::test]
async fn test_stdin_roundtrips_to_stdout() {
    let mut handle = ProcessHandle::new();
    let pid = handle.try_spawn("cat", &[], &[]).expect("Failed to spawn cat");
    assert!(pid > 0);

    let mut stdin = handle.take_stdin().expect("stdin stream should be attached");
    let mut stdout = handle.take_stdout().expect("stdout stream should be attached");

    stdin.write_all(b"ping through the pipe\n").await.unwrap();
    drop(stdin); // EOF so cat exits

    let mut buf = Vec::new();
    stdout.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"ping through the pipe\n");

    assert_eq!(poll_until_exit(&mut handle).await, 0);
    handle.close();
}

/// Test that environment overrides reach the child, last write winning
#[tokio::test]
async fn test_environment_override_propagates() {
    let mut handle = ProcessHandle::new();
    handle
        .try_spawn(
            "sh",
            &args(&["-c", "printf %s \"$FOO\""]),
            &env(&[("FOO", "ignored"), ("FOO", "bar")]),
        )
        .expect("Failed to spawn sh");

    let mut stdout = handle.take_stdout().unwrap();
    let mut out = String::new();
    stdout.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "bar");
    handle.close();
}

/// Test that stderr is captured separately from stdout
#[tokio::test]
async fn test_stderr_is_captured_separately() {
    let mut handle = ProcessHandle::new();
    handle
        .try_spawn("sh", &args(&["-c", "echo error >&2"]), &[])
        .expect("Failed to spawn sh");

    let mut stdout = handle.take_stdout().unwrap();
    let mut stderr = handle.take_stderr().unwrap();

    let mut out = String::new();
    stdout.read_to_string(&mut out).await.unwrap();
    let mut err = String::new();
    stderr.read_to_string(&mut err).await.unwrap();

    assert!(out.is_empty());
    assert_eq!(err, "error\n");
    handle.close();
}

/// Test the running -> terminal status transition and terminal stability
#[tokio::test]
async fn test_status_reports_running_then_exit_code() {
    let mut handle = ProcessHandle::new();
    handle
        .try_spawn("sleep", &args(&["0.2"]), &[])
        .expect("Failed to spawn sleep");

    assert_eq!(handle.status(), STATUS_RUNNING);
    assert!(handle.pid().is_some());

    assert_eq!(poll_until_exit(&mut handle).await, 0);
    // repeated polling after exit keeps returning the terminal value
    assert_eq!(handle.status(), 0);
    assert_eq!(handle.status(), 0);

    handle.close();
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);
}

/// Test that a nonzero exit code surfaces as the status value
#[tokio::test]
async fn test_status_reports_nonzero_exit_code() {
    let mut handle = ProcessHandle::new();
    handle
        .try_spawn("sh", &args(&["-c", "exit 42"]), &[])
        .expect("Failed to spawn sh");
    assert_eq!(poll_until_exit(&mut handle).await, 42);
    handle.close();
}

/// Test that invalid spawn input fails before any resource is created
#[tokio::test]
async fn test_invalid_env_key_fails_before_any_resources() {
    let before = open_fd_count();

    let mut handle = ProcessHandle::new();
    let err = handle
        .try_spawn("cat", &[], &env(&[("BAD=KEY", "v")]))
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidArgument(_)));
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);
    assert!(handle.take_stdin().is_none());

    assert_eq!(open_fd_count(), before);
}

/// Test error handling for commands that cannot be executed
#[tokio::test]
async fn test_spawn_nonexistent_command() {
    let mut handle = ProcessHandle::new();

    // numeric boundary: failure is a negative status, not a panic
    let rc = handle.spawn("this_command_definitely_does_not_exist_12345", &[], &[]);
    assert_eq!(rc, -1);
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);

    // rich boundary: failure names the command
    match handle
        .try_spawn("this_command_definitely_does_not_exist_12345", &[], &[])
        .unwrap_err()
    {
        CoreError::ProcessSpawn(msg) => assert!(msg.contains("12345")),
        e => panic!("Expected ProcessSpawn error, got: {:?}", e),
    }
}

/// Test that spawning on a handle with an open spawn fails
#[tokio::test]
async fn test_spawn_while_running_fails() {
    let mut handle = ProcessHandle::new();
    handle
        .try_spawn("sleep", &args(&["0.5"]), &[])
        .expect("Failed to spawn sleep");

    let err = handle.try_spawn("true", &[], &[]).unwrap_err();
    assert!(matches!(err, CoreError::AlreadyRunning(_)));

    // replace semantics are spelled close-then-spawn
    handle.close();
    handle.try_spawn("true", &[], &[]).expect("handle should be reusable");
    poll_until_exit(&mut handle).await;
    handle.close();
}

/// Test close idempotence and table clearing
#[tokio::test]
async fn test_close_is_idempotent_and_clears_tables() {
    let mut handle = ProcessHandle::new();

    // close on a never-spawned handle is a no-op
    handle.close().close();
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);

    handle
        .try_spawn("sh", &args(&["-c", "exit 0"]), &env(&[("K", "V")]))
        .expect("Failed to spawn sh");
    assert_eq!(handle.argument_table(), args(&["-c", "exit 0"]).as_slice());
    assert_eq!(handle.environment_table().len(), 1);

    poll_until_exit(&mut handle).await;
    handle.close();
    assert!(handle.argument_table().is_empty());
    assert!(handle.environment_table().is_empty());
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);

    // second and third close have no further effect
    handle.close().close();
    assert_eq!(handle.status(), STATUS_NOT_RUNNING);
}

/// Test that repeated spawn/close cycles leave the descriptor count unchanged
#[tokio::test]
async fn test_repeated_spawn_close_does_not_leak_descriptors() {
    // Warm up the reactor so its own descriptors exist before the baseline.
    {
        let mut handle = ProcessHandle::new();
        handle.try_spawn("true", &[], &[]).unwrap();
        poll_until_exit(&mut handle).await;
        handle.close();
    }

    let before = open_fd_count();
    for _ in 0..10 {
        let mut handle = ProcessHandle::new();
        handle.try_spawn("true", &[], &[]).unwrap();
        drop(handle.take_stdin());
        drop(handle.take_stdout());
        drop(handle.take_stderr());
        poll_until_exit(&mut handle).await;
        handle.close();
    }
    assert_eq!(open_fd_count(), before);
}

/// Test that close releases stream handles the caller never took
#[tokio::test]
async fn test_close_releases_untaken_streams() {
    // Warm up as above.
    {
        let mut handle = ProcessHandle::new();
        handle.try_spawn("true", &[], &[]).unwrap();
        poll_until_exit(&mut handle).await;
        handle.close();
    }

    let before = open_fd_count();
    let mut handle = ProcessHandle::new();
    handle.try_spawn("cat", &[], &[]).unwrap();
    // closing drops the stdin writer; cat sees EOF and exits on its own
    handle.close();
    assert_eq!(open_fd_count(), before);
}

/// Test that dropping the handle behaves like close
#[tokio::test]
async fn test_drop_tears_down_like_close() {
    {
        let mut handle = ProcessHandle::new();
        handle.try_spawn("true", &[], &[]).unwrap();
        poll_until_exit(&mut handle).await;
        handle.close();
    }

    let before = open_fd_count();
    {
        let mut handle = ProcessHandle::new();
        handle.try_spawn("cat", &[], &[]).unwrap();
        // dropped without close or take_*
    }
    assert_eq!(open_fd_count(), before);
}

/// Test spawning from a SpawnSpec with null stdio and a working directory
#[tokio::test]
async fn test_spawn_spec_stdio_modes_and_working_dir() {
    let mut handle = ProcessHandle::new();
    let spec = SpawnSpec::new("pwd").working_dir("/tmp").stdio(StdioConfig {
        stdin: StdioMode::Null,
        stdout: StdioMode::Piped,
        stderr: StdioMode::Null,
    });
    handle.spawn_spec(&spec).expect("Failed to spawn pwd");

    assert!(handle.take_stdin().is_none(), "null stdin has no stream handle");
    assert!(handle.take_stderr().is_none(), "null stderr has no stream handle");

    let mut stdout = handle.take_stdout().unwrap();
    let mut out = String::new();
    stdout.read_to_string(&mut out).await.unwrap();
    assert!(out.trim_end().ends_with("tmp"));
    handle.close();
}

/// Test driving a spawn from a TOML spec end to end
#[tokio::test]
async fn test_spawn_from_toml_spec() {
    let spec = subproc_core::load_spec_from_toml_str(
        r#"
        command = "sh"
        args = ["-c", "printf %s \"$GREETING\""]

        [env]
        GREETING = "hello from toml"

        [stdio]
        stdin = "null"
        "#,
    )
    .expect("spec should parse");

    let mut handle = ProcessHandle::new();
    handle.spawn_spec(&spec).expect("Failed to spawn from spec");

    let mut stdout = handle.take_stdout().unwrap();
    let mut out = String::new();
    stdout.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "hello from toml");
    handle.close();
}
