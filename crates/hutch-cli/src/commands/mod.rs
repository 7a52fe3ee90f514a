//! CLI command definitions and dispatch.

pub mod commit;
pub mod exec;
pub mod init;
pub mod logs;
pub mod network;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hutch_common::config::HutchConfig;
use hutch_common::constants::DEFAULT_DATA_DIR;
use hutch_runtime::engine::Engine;

/// Hutch — a minimal, daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "hutch", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Base directory for images, containers and network state.
    #[arg(long, global = true, env = "HUTCH_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// JSON configuration file; overrides `--data-dir`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start a container.
    Run(run::RunArgs),
    /// Container-side init; not meant to be called by hand.
    #[command(hide = true)]
    Init,
    /// Archive a container's filesystem as a new image.
    Commit(commit::CommitArgs),
    /// List containers.
    Ps,
    /// Print the logs of a detached container.
    Logs(logs::LogsArgs),
    /// Run a command inside a running container.
    Exec(exec::ExecArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a container.
    Rm(rm::RmArgs),
    /// Manage bridge networks.
    #[command(subcommand)]
    Network(network::NetworkCommand),
}

impl Cli {
    /// Builds the runtime configuration from the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names an unreadable or invalid file.
    pub fn runtime_config(&self) -> anyhow::Result<HutchConfig> {
        match &self.config {
            Some(path) => HutchConfig::load(path).map_err(|e| anyhow::anyhow!("{e}")),
            None => Ok(HutchConfig::from_data_dir(&self.data_dir)),
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Command::Init) {
        return init::execute();
    }

    let engine = Engine::new(cli.runtime_config()?);
    tracing::debug!(data_dir = %engine.config().data_dir.display(), "engine ready");
    match cli.command {
        Command::Run(args) => run::execute(&engine, args),
        Command::Init => init::execute(),
        Command::Commit(args) => commit::execute(&engine, &args),
        Command::Ps => ps::execute(&engine),
        Command::Logs(args) => logs::execute(&engine, &args),
        Command::Exec(args) => exec::execute(&engine, &args),
        Command::Stop(args) => stop::execute(&engine, &args),
        Command::Rm(args) => rm::execute(&engine, &args),
        Command::Network(cmd) => network::execute(&engine, cmd),
    }
}
