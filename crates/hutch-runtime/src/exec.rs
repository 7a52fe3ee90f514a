//! Namespace joining for executing commands in running containers.

use std::process::Command;

use hutch_common::error::{HutchError, Result};
use hutch_core::namespace::NamespaceConfig;

/// Builds the `nsenter` invocation that runs `command` inside the namespaces
/// of `pid`, adding the container's environment to the caller's.
#[must_use]
pub fn nsenter_command(pid: u32, command: &[String], env: &[(String, String)]) -> Command {
    let mut cmd = Command::new("nsenter");
    let _ = cmd
        .args(NamespaceConfig::default().nsenter_args(pid))
        .arg("--")
        .args(command)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd
}

/// Joins the namespaces of a running container and runs a command with the
/// caller's standard streams, returning its exit code.
///
/// # Errors
///
/// Returns an error if the command is empty or `nsenter` cannot be started.
pub fn exec_in_container(pid: u32, command: &[String], env: &[(String, String)]) -> Result<i32> {
    if command.is_empty() {
        return Err(HutchError::config("exec command is empty"));
    }
    tracing::info!(pid, cmd = ?command, "exec into container");

    let status = nsenter_command(pid, command, env)
        .status()
        .map_err(|e| HutchError::Command {
            program: "nsenter",
            message: e.to_string(),
        })?;
    Ok(status.code().unwrap_or(-1))
}

/// Reads the environment of a process from `/proc/<pid>/environ`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_environ(pid: u32) -> Result<Vec<(String, String)>> {
    let path = format!("/proc/{pid}/environ");
    let raw = std::fs::read(&path).map_err(|e| HutchError::io(&path, e))?;
    Ok(parse_environ(&raw))
}

/// Splits a NUL-separated `KEY=VALUE` block. Entries without `=` are dropped.
fn parse_environ(raw: &[u8]) -> Vec<(String, String)> {
    raw.split(|b| *b == 0)
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}
