//! `hutch logs` — View container logs.

use clap::Args;
use hutch_common::types::ContainerId;
use hutch_runtime::engine::Engine;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
#[allow(clippy::print_stdout)]
pub fn execute(engine: &Engine, args: &LogsArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(&args.container);
    let logs = engine.logs(&id).map_err(|e| anyhow::anyhow!("{e}"))?;
    print!("{logs}");
    Ok(())
}
