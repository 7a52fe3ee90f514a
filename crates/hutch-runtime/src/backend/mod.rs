//! Process backend abstraction.
//!
//! The lifecycle code never forks or signals processes directly; it goes
//! through [`ContainerBackend`], so the orchestration logic can run against a
//! fake in tests.

pub mod linux;

use std::os::fd::BorrowedFd;
use std::path::PathBuf;

use nix::sys::signal::Signal;

use hutch_common::error::Result;
use hutch_core::namespace::NamespaceConfig;

/// Where the container init's standard streams go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit the caller's terminal.
    Inherit,
    /// Redirect stdout and stderr (appending) to a log file.
    LogFile(PathBuf),
}

/// Everything needed to start a container init process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Binary to execute, normally `/proc/self/exe`.
    pub program: PathBuf,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// Namespaces the process is created in.
    pub namespaces: NamespaceConfig,
    /// Working directory, the merged root filesystem.
    pub cwd: PathBuf,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// Standard stream handling.
    pub stdio: StdioMode,
}

/// Platform process operations used by the lifecycle coordinator.
pub trait ContainerBackend {
    /// Starts the init process described by `request`.
    ///
    /// `pipe` is the read end of the command pipe; the child must receive it
    /// as descriptor 3. Returns the host pid of the child.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be created.
    fn spawn(&self, request: &SpawnRequest, pipe: BorrowedFd<'_>) -> Result<u32>;

    /// Waits for a spawned process to exit and returns its exit code.
    ///
    /// A process killed by a signal reports `128 + signal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited for.
    fn wait(&self, pid: u32) -> Result<i32>;

    /// Sends `signal` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    fn signal(&self, pid: u32, signal: Signal) -> Result<()>;

    /// Whether a process with this pid currently exists.
    fn is_alive(&self, pid: u32) -> bool;
}
