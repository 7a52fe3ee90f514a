//! `hutch rm` — Remove a container.

use clap::Args;
use hutch_common::types::ContainerId;
use hutch_runtime::engine::Engine;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container ID.
    pub container: String,

    /// Stop the container first if it is still running.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container is unknown, or running without `-f`.
pub fn execute(engine: &Engine, args: &RmArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(&args.container);
    engine
        .remove(&id, args.force)
        .map_err(|e| anyhow::anyhow!("{e}"))
}
