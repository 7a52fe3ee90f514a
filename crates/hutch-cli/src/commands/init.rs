//! `hutch init` — Runs inside the container's namespaces.

use hutch_core::filesystem::mount::SysMounter;
use hutch_runtime::init::run_container_init;

/// Executes the hidden `init` command.
///
/// On success the process image is replaced by the container command and
/// this function never returns.
///
/// # Errors
///
/// Returns an error if the container root cannot be set up or the command
/// cannot be executed.
pub fn execute() -> anyhow::Result<()> {
    tracing::debug!("container init starting");
    match run_container_init(&SysMounter) {
        Ok(never) => match never {},
        Err(e) => Err(anyhow::anyhow!("container init failed: {e}")),
    }
}
