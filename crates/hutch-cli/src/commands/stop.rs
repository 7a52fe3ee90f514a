//! `hutch stop` — Stop a running container.

use clap::Args;
use hutch_common::types::ContainerId;
use hutch_runtime::engine::Engine;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or not running.
pub fn execute(engine: &Engine, args: &StopArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(&args.container);
    engine.stop(&id).map_err(|e| anyhow::anyhow!("{e}"))
}
