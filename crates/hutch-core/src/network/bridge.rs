//! Linux bridge network driver.
//!
//! A network is a bridge interface named after the network, holding the
//! gateway address and masquerading its subnet. Each container endpoint is a
//! veth pair whose host end is enslaved to the bridge.

use ipnetwork::Ipv4Network;

use hutch_common::constants::BRIDGE_DRIVER;
use hutch_common::error::Result;

use super::firewall::{MasqueradeRule, RuleAction};
use super::link::LinkOps;
use super::{Endpoint, Network, VethPair};

/// Bridge driver operating through a [`LinkOps`] implementation.
pub struct BridgeDriver<'a> {
    links: &'a dyn LinkOps,
}

impl<'a> BridgeDriver<'a> {
    /// Creates a driver using the given link operations.
    #[must_use]
    pub fn new(links: &'a dyn LinkOps) -> Self {
        Self { links }
    }

    /// Driver name recorded in network records.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        BRIDGE_DRIVER
    }

    /// Creates (or adopts) the bridge `name` for `subnet`.
    ///
    /// The address part of `subnet` becomes the gateway assigned to the
    /// bridge. An existing interface of the same name is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface lookup fails, or if creating,
    /// addressing, raising the bridge, or installing the NAT rule fails.
    pub fn create(&self, subnet: Ipv4Network, name: &str) -> Result<Network> {
        if self.links.link_exists(name)? {
            tracing::debug!(bridge = name, "bridge already exists");
        } else {
            self.links.add_bridge(name)?;
        }
        self.links.add_addr(name, &subnet)?;
        self.links.set_up(name)?;
        self.links
            .iptables(&MasqueradeRule::new(subnet, name).args(RuleAction::Append))?;

        tracing::info!(bridge = name, gateway = %subnet, "bridge network created");
        Ok(Network {
            name: name.to_string(),
            ip_range: subnet,
            driver: self.name().to_string(),
        })
    }

    /// Removes the bridge and its NAT rule.
    ///
    /// The rule is removed even if deleting the interface fails.
    ///
    /// # Errors
    ///
    /// Returns the interface deletion error, if any.
    pub fn delete(&self, network: &Network) -> Result<()> {
        let removed = self.links.delete_link(&network.name);
        let rule = MasqueradeRule::new(network.ip_range, &network.name);
        if let Err(e) = self.links.iptables(&rule.args(RuleAction::Delete)) {
            tracing::warn!(bridge = %network.name, error = %e, "failed to delete NAT rule");
        }
        removed?;
        tracing::info!(bridge = %network.name, "bridge network deleted");
        Ok(())
    }

    /// Creates the endpoint's veth pair, attaches the host end to the
    /// network's bridge and brings both ends up.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be created or raised.
    pub fn connect(&self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        let dev = &endpoint.device;
        self.links.add_veth(&dev.name, &dev.peer, &network.name)?;
        self.links.set_up(&dev.name)?;
        self.links.set_up(&dev.peer)?;
        tracing::info!(endpoint = %endpoint.id, veth = %dev.name, bridge = %network.name, "endpoint connected");
        Ok(())
    }

    /// Detaches and deletes both ends of the endpoint's veth pair.
    ///
    /// Each step is attempted even if an earlier one fails; failures are
    /// logged. Deleting one end of a pair usually removes the other, so a
    /// missing peer is expected.
    pub fn disconnect(&self, endpoint_id: &str) {
        let dev = VethPair::for_endpoint(endpoint_id);
        if let Err(e) = self.links.set_nomaster(&dev.name) {
            tracing::warn!(veth = %dev.name, error = %e, "failed to detach veth from bridge");
        }
        for name in [&dev.name, &dev.peer] {
            if let Err(e) = self.links.delete_link(name) {
                tracing::warn!(veth = %name, error = %e, "failed to delete veth");
            }
        }
        tracing::info!(endpoint = endpoint_id, "endpoint disconnected");
    }
}
