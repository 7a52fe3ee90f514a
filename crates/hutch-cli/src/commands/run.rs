//! `hutch run` — Create and start a container.

use clap::Args;
use hutch_common::types::{PortMapping, ResourceLimits};
use hutch_runtime::engine::{Engine, RunOptions};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Keep the container attached to this terminal until it exits.
    #[arg(short = 'i', long = "it")]
    pub tty: bool,

    /// Run in the background, sending output to the container log.
    #[arg(short, long)]
    pub detach: bool,

    /// Memory limit, e.g. `100m`.
    #[arg(long)]
    pub mem: Option<String>,

    /// CPU quota as a percentage of one CPU.
    #[arg(long)]
    pub cpu: Option<u64>,

    /// Relative CPU weight.
    #[arg(long)]
    pub cpu_shares: Option<String>,

    /// CPUs the container may run on, e.g. `0-1,3`.
    #[arg(long)]
    pub cpuset: Option<String>,

    /// Bind mount, `hostPath:containerPath`.
    #[arg(short, long)]
    pub volume: Option<String>,

    /// Container name.
    #[arg(long)]
    pub name: Option<String>,

    /// Environment variable, `KEY=VALUE`. Repeatable.
    #[arg(short, long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Network to attach the container to.
    #[arg(long = "net")]
    pub network: Option<String>,

    /// Port forwarding, `hostPort:containerPort`. Repeatable.
    #[arg(short = 'p', long = "publish")]
    pub ports: Vec<PortMapping>,

    /// Image to run.
    pub image: String,

    /// Command and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

fn parse_env(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, val)| (key.to_string(), val.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {value:?}"))
}

impl RunArgs {
    fn into_options(self) -> RunOptions {
        RunOptions {
            tty: self.tty,
            detach: self.detach,
            image: self.image,
            command: self.command,
            limits: ResourceLimits {
                memory: self.mem,
                cpu_quota_percent: self.cpu,
                cpu_shares: self.cpu_shares,
                cpuset: self.cpuset,
            },
            volume: self.volume,
            name: self.name,
            env: self.env,
            network: self.network,
            ports: self.ports,
        }
    }
}

/// Executes the `run` command.
///
/// A detached run prints the container id. A foreground run exits with the
/// container's exit code.
///
/// # Errors
///
/// Returns an error if the container cannot be created or started.
#[allow(clippy::print_stdout)]
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<()> {
    let outcome = engine
        .run(&args.into_options())
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    match outcome.exit_code {
        None => {
            println!("{}", outcome.id);
            Ok(())
        }
        Some(0) => Ok(()),
        Some(code) => std::process::exit(code),
    }
}
