//! `hutch network` — Manage bridge networks.

use clap::{Args, Subcommand};
use hutch_common::constants::BRIDGE_DRIVER;
use hutch_runtime::engine::Engine;
use ipnetwork::Ipv4Network;

use crate::output;

/// Network subcommands.
#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Create a network.
    Create(CreateArgs),
    /// List networks.
    List,
    /// Remove a network.
    Remove(RemoveArgs),
}

/// Arguments for `network create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Network driver.
    #[arg(long, default_value = BRIDGE_DRIVER)]
    pub driver: String,

    /// Subnet in CIDR notation, e.g. `172.18.0.0/24`.
    #[arg(long)]
    pub subnet: Ipv4Network,

    /// Network name, also used as the bridge interface name.
    pub name: String,
}

/// Arguments for `network remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Network name.
    pub name: String,
}

/// Executes a `network` subcommand.
///
/// # Errors
///
/// Returns an error if the network operation fails.
#[allow(clippy::print_stdout)]
pub fn execute(engine: &Engine, command: NetworkCommand) -> anyhow::Result<()> {
    match command {
        NetworkCommand::Create(args) => {
            let network = engine
                .create_network(&args.driver, args.subnet, &args.name)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(network = %network.name, gateway = %network.gateway(), "network ready");
            Ok(())
        }
        NetworkCommand::List => {
            let networks = engine.list_networks().map_err(|e| anyhow::anyhow!("{e}"))?;
            print!("{}", output::network_table(&networks));
            Ok(())
        }
        NetworkCommand::Remove(args) => engine
            .remove_network(&args.name)
            .map_err(|e| anyhow::anyhow!("{e}")),
    }
}
