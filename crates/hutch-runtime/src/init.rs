//! Container-side init.
//!
//! Runs as the first process inside the new namespaces. It waits for the
//! parent to send the user command, finishes the mount setup and replaces
//! itself with the command.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;
use std::path::Path;

use hutch_common::constants::INIT_PIPE_FD;
use hutch_common::error::{HutchError, Result};
use hutch_core::filesystem::mount::{self, Mounter};
use hutch_core::filesystem::pivot_root::pivot_root;

/// Sets up the container root and execs the user command.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns an error if the command cannot be read, a mount step fails, or
/// the command cannot be resolved or executed.
pub fn run_container_init(mounter: &dyn Mounter) -> Result<Infallible> {
    // SAFETY: the parent installs the read end of the command pipe as
    // INIT_PIPE_FD before exec, and nothing else in this process owns it.
    let pipe = unsafe { File::from_raw_fd(INIT_PIPE_FD) };
    let argv = read_command(pipe)?;
    tracing::debug!(cmd = ?argv, "init command received");

    setup_mounts(mounter)?;

    let program = which::which(&argv[0]).map_err(|e| HutchError::Command {
        program: "init",
        message: format!("cannot find {:?} on PATH: {e}", argv[0]),
    })?;
    tracing::info!(program = %program.display(), "executing container command");

    let path = to_cstring(program.as_os_str().to_string_lossy().into_owned())?;
    let args = argv
        .into_iter()
        .map(to_cstring)
        .collect::<Result<Vec<_>>>()?;
    nix::unistd::execv(&path, &args).map_err(|e| HutchError::Syscall {
        message: format!("execve {} failed: {e}", program.display()),
    })
}

/// Reads the JSON command array sent by the parent until end of file.
///
/// # Errors
///
/// Returns an error on read failure, malformed JSON, or an empty command.
pub fn read_command(mut pipe: impl Read) -> Result<Vec<String>> {
    let mut payload = Vec::new();
    let _ = pipe
        .read_to_end(&mut payload)
        .map_err(|e| HutchError::io("init pipe", e))?;
    if payload.is_empty() {
        return Err(HutchError::config("init received no command"));
    }
    let argv: Vec<String> = serde_json::from_slice(&payload)?;
    if argv.is_empty() {
        return Err(HutchError::config("init received an empty command"));
    }
    Ok(argv)
}

fn setup_mounts(mounter: &dyn Mounter) -> Result<()> {
    let root = std::env::current_dir().map_err(|e| HutchError::io(".", e))?;
    mount::make_private(mounter)?;
    pivot_root(mounter, &root)?;

    let new_root = Path::new("/");
    mount::mount_proc(mounter, new_root)?;
    mount::mount_dev(mounter, new_root)
}

fn to_cstring(value: String) -> Result<CString> {
    CString::new(value).map_err(|e| HutchError::config(format!("argument contains NUL: {e}")))
}
