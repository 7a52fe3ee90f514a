//! Network link operations.
//!
//! [`LinkOps`] is the narrow set of interface, address, route and firewall
//! mutations the bridge driver needs. [`IpRoute2`] performs them with the
//! standard `ip(8)`, `iptables(8)` and `nsenter(1)` tools.

use std::net::Ipv4Addr;
use std::process::Command;

use ipnetwork::Ipv4Network;
use nix::errno::Errno;

use hutch_common::error::{HutchError, Result};

/// Host networking operations used to wire containers to a bridge.
pub trait LinkOps {
    /// Whether an interface with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails for a reason other than the
    /// interface being absent.
    fn link_exists(&self, name: &str) -> Result<bool>;

    /// Creates a bridge interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge cannot be created.
    fn add_bridge(&self, name: &str) -> Result<()>;

    /// Assigns `addr` (address and prefix) to an interface, installing the
    /// subnet route.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be added.
    fn add_addr(&self, name: &str, addr: &Ipv4Network) -> Result<()>;

    /// Brings an interface up.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface state cannot be changed.
    fn set_up(&self, name: &str) -> Result<()>;

    /// Creates a veth pair and attaches `name` to the `master` bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be created or attached.
    fn add_veth(&self, name: &str, peer: &str, master: &str) -> Result<()>;

    /// Detaches an interface from its bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface does not exist or cannot be changed.
    fn set_nomaster(&self, name: &str) -> Result<()>;

    /// Deletes an interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface does not exist or cannot be removed.
    fn delete_link(&self, name: &str) -> Result<()>;

    /// Moves an interface into the network namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be moved.
    fn move_to_netns(&self, name: &str, pid: u32) -> Result<()>;

    /// Inside the network namespace of `pid`: assigns `addr` to `name`, brings
    /// `lo` and `name` up, and routes everything else through `gateway`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the steps fails.
    fn configure_in_netns(
        &self,
        pid: u32,
        name: &str,
        addr: &Ipv4Network,
        gateway: Ipv4Addr,
    ) -> Result<()>;

    /// Runs one `iptables` invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot be changed.
    fn iptables(&self, args: &[String]) -> Result<()>;
}

/// [`LinkOps`] implemented with the iproute2 and iptables command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpRoute2;

impl IpRoute2 {
    fn ip(args: &[&str]) -> Result<()> {
        run("ip", Command::new("ip").args(args))
    }

    fn ip_in_netns(pid: u32, args: &[&str]) -> Result<()> {
        let target = pid.to_string();
        run(
            "nsenter",
            Command::new("nsenter")
                .args(["--target", target.as_str(), "--net", "ip"])
                .args(args),
        )
    }
}

impl LinkOps for IpRoute2 {
    fn link_exists(&self, name: &str) -> Result<bool> {
        match nix::net::if_::if_nametoindex(name) {
            Ok(_) => Ok(true),
            Err(Errno::ENODEV) => Ok(false),
            Err(e) => Err(HutchError::Syscall {
                message: format!("looking up interface {name} failed: {e}"),
            }),
        }
    }

    fn add_bridge(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "add", "name", name, "type", "bridge"])
    }

    fn add_addr(&self, name: &str, addr: &Ipv4Network) -> Result<()> {
        Self::ip(&["addr", "add", &addr.to_string(), "dev", name])
    }

    fn set_up(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "set", name, "up"])
    }

    fn add_veth(&self, name: &str, peer: &str, master: &str) -> Result<()> {
        Self::ip(&["link", "add", name, "type", "veth", "peer", "name", peer])?;
        Self::ip(&["link", "set", name, "master", master])
    }

    fn set_nomaster(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "set", name, "nomaster"])
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        Self::ip(&["link", "del", name])
    }

    fn move_to_netns(&self, name: &str, pid: u32) -> Result<()> {
        Self::ip(&["link", "set", name, "netns", &pid.to_string()])
    }

    fn configure_in_netns(
        &self,
        pid: u32,
        name: &str,
        addr: &Ipv4Network,
        gateway: Ipv4Addr,
    ) -> Result<()> {
        Self::ip_in_netns(pid, &["addr", "add", &addr.to_string(), "dev", name])?;
        Self::ip_in_netns(pid, &["link", "set", "lo", "up"])?;
        Self::ip_in_netns(pid, &["link", "set", name, "up"])?;
        Self::ip_in_netns(pid, &["route", "add", "default", "via", &gateway.to_string()])
    }

    fn iptables(&self, args: &[String]) -> Result<()> {
        run("iptables", Command::new("iptables").args(args))
    }
}

/// Runs a prepared command, turning a non-zero exit into an error carrying
/// its stderr.
fn run(program: &'static str, cmd: &mut Command) -> Result<()> {
    tracing::debug!(command = ?cmd, "running");
    let output = cmd.output().map_err(|e| HutchError::Command {
        program,
        message: e.to_string(),
    })?;
    if output.status.success() {
        return Ok(());
    }
    Err(HutchError::Command {
        program,
        message: format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    })
}
