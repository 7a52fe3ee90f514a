//! Linux backend: `clone(2)` straight into the container namespaces.

use std::convert::Infallible;
use std::ffi::{CString, OsStr};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use hutch_common::constants::INIT_PIPE_FD;
use hutch_common::error::{HutchError, Result};

use super::{ContainerBackend, SpawnRequest, StdioMode};

/// Stack handed to the cloned child until it calls `execve`.
const STACK_SIZE: usize = 1024 * 1024;

/// Exit status of a child that failed before `execve`.
const SETUP_FAILED: isize = 127;

/// Backend that uses Linux kernel features directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBackend;

impl LinuxBackend {
    /// Creates a new Linux backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ContainerBackend for LinuxBackend {
    fn spawn(&self, request: &SpawnRequest, pipe: BorrowedFd<'_>) -> Result<u32> {
        // Everything the child touches is prepared here, before the clone.
        let program = c_string(request.program.as_os_str())?;
        let mut argv = vec![program.clone()];
        for arg in &request.args {
            argv.push(c_string(OsStr::new(arg))?);
        }
        let envp = environment(&request.env)?;

        let log = match &request.stdio {
            StdioMode::Inherit => None,
            StdioMode::LogFile(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| HutchError::io(path, e))?,
            ),
        };
        let log_fd = log.as_ref().map(AsRawFd::as_raw_fd);
        let pipe_fd = pipe.as_raw_fd();
        let cwd = request.cwd.as_path();

        let mut stack = vec![0_u8; STACK_SIZE];
        let child = Box::new(|| match exec_init(pipe_fd, log_fd, cwd, &program, &argv, &envp) {
            Ok(never) => match never {},
            Err(e) => {
                let _ = writeln!(std::io::stderr(), "hutch: container init setup failed: {e}");
                SETUP_FAILED
            }
        });

        // SAFETY: the child does not share memory with the parent (no
        // CLONE_VM), the caller is single-threaded, and the child only
        // duplicates descriptors, changes directory and calls execve.
        let pid = unsafe {
            nix::sched::clone(
                child,
                &mut stack,
                request.namespaces.clone_flags(),
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|e| HutchError::Syscall {
            message: format!("clone failed: {e}"),
        })?;
        drop(log);

        tracing::info!(pid = pid.as_raw(), cwd = %request.cwd.display(), "container init spawned");
        u32::try_from(pid.as_raw()).map_err(|_| HutchError::Syscall {
            message: format!("clone returned invalid pid {pid}"),
        })
    }

    fn wait(&self, pid: u32) -> Result<i32> {
        let pid = to_pid(pid)?;
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(128 + sig as i32),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(HutchError::Syscall {
                        message: format!("waitpid({pid}) failed: {e}"),
                    });
                }
            }
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        signal::kill(to_pid(pid)?, signal).map_err(|e| HutchError::Syscall {
            message: format!("kill({pid}, {signal}) failed: {e}"),
        })
    }

    fn is_alive(&self, pid: u32) -> bool {
        to_pid(pid).is_ok_and(|pid| signal::kill(pid, None).is_ok())
    }
}

/// Runs in the cloned child: installs descriptors, enters the root
/// filesystem directory and replaces the process image.
fn exec_init(
    pipe_fd: RawFd,
    log_fd: Option<RawFd>,
    cwd: &Path,
    program: &CString,
    argv: &[CString],
    envp: &[CString],
) -> nix::Result<Infallible> {
    if let Some(log_fd) = log_fd {
        redirect(log_fd, libc::STDOUT_FILENO)?;
        redirect(log_fd, libc::STDERR_FILENO)?;
    }
    redirect(pipe_fd, INIT_PIPE_FD)?;
    nix::unistd::chdir(cwd)?;
    nix::unistd::execve(program, argv, envp)
}

/// Makes `from` available as `to` across `execve`.
fn redirect(from: RawFd, to: RawFd) -> nix::Result<()> {
    if from == to {
        // SAFETY: `from` is an open descriptor inherited from the parent.
        let flags = Errno::result(unsafe { libc::fcntl(from, libc::F_GETFD) })?;
        // SAFETY: as above; only the close-on-exec bit is cleared.
        let _ = Errno::result(unsafe { libc::fcntl(from, libc::F_SETFD, flags & !libc::FD_CLOEXEC) })?;
        return Ok(());
    }
    // SAFETY: `from` is open; dup2 atomically replaces `to` and the copy
    // does not carry the close-on-exec flag.
    let _ = Errno::result(unsafe { libc::dup2(from, to) })?;
    Ok(())
}

/// The caller's environment with `extra` added, later values winning.
fn environment(extra: &[(String, String)]) -> Result<Vec<CString>> {
    let mut vars: Vec<(Vec<u8>, Vec<u8>)> = std::env::vars_os()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    for (key, value) in extra {
        vars.retain(|(k, _)| k.as_slice() != key.as_bytes());
        vars.push((key.as_bytes().to_vec(), value.as_bytes().to_vec()));
    }
    vars.into_iter()
        .map(|(mut k, v)| {
            k.push(b'=');
            k.extend_from_slice(&v);
            CString::new(k).map_err(|e| HutchError::config(format!("invalid environment entry: {e}")))
        })
        .collect()
}

fn c_string(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes())
        .map_err(|e| HutchError::config(format!("argument contains NUL byte: {e}")))
}

fn to_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| HutchError::config(format!("pid {pid} out of range")))
}
