//! `hutch ps` — List containers.

use hutch_runtime::engine::Engine;

use crate::output;

/// Executes the `ps` command.
///
/// Containers whose init has exited since the last listing are reported as
/// `exited`.
///
/// # Errors
///
/// Returns an error if container records cannot be read.
#[allow(clippy::print_stdout)]
pub fn execute(engine: &Engine) -> anyhow::Result<()> {
    let containers = engine.list().map_err(|e| anyhow::anyhow!("{e}"))?;
    print!("{}", output::container_table(&containers));
    Ok(())
}
