//! `hutch commit` — Archive a container's filesystem as an image.

use clap::Args;
use hutch_common::types::ContainerId;
use hutch_runtime::engine::Engine;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Container ID.
    pub container: String,

    /// Name of the new image.
    pub image: String,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or the archive cannot be
/// written.
pub fn execute(engine: &Engine, args: &CommitArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(&args.container);
    engine
        .commit(&id, &args.image)
        .map_err(|e| anyhow::anyhow!("{e}"))
}
