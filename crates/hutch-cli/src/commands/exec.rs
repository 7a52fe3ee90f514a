//! `hutch exec` — Execute a command inside a running container.

use clap::Args;
use hutch_common::types::ContainerId;
use hutch_runtime::engine::Engine;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container ID.
    pub container: String,

    /// Command to execute.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Joins the target container's namespaces and runs the command with this
/// terminal's standard streams, then exits with its exit code.
///
/// # Errors
///
/// Returns an error if the container is not running or namespace joining fails.
pub fn execute(engine: &Engine, args: &ExecArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(&args.container);
    let code = engine
        .exec(&id, &args.command)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    std::process::exit(code);
}
