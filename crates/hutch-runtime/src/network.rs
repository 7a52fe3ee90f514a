//! Network lifecycle on top of the bridge driver and the address allocator.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use hutch_common::config::HutchConfig;
use hutch_common::constants::BRIDGE_DRIVER;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, PortMapping};
use hutch_core::network::bridge::BridgeDriver;
use hutch_core::network::firewall::{DnatRule, RuleAction};
use hutch_core::network::ipam::Ipam;
use hutch_core::network::link::LinkOps;
use hutch_core::network::{Endpoint, Network};

/// Creates, removes and attaches containers to bridge networks.
pub struct NetworkManager<'a> {
    config: &'a HutchConfig,
    links: &'a dyn LinkOps,
}

impl<'a> NetworkManager<'a> {
    /// Creates a manager persisting state under `config`.
    #[must_use]
    pub fn new(config: &'a HutchConfig, links: &'a dyn LinkOps) -> Self {
        Self { config, links }
    }

    fn ipam(&self) -> Ipam {
        Ipam::new(&self.config.ipam_file)
    }

    fn driver(&self) -> BridgeDriver<'a> {
        BridgeDriver::new(self.links)
    }

    /// Creates network `name` on `subnet`. The first host address becomes
    /// the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown driver or an existing name, or if
    /// allocation, bridge setup or persisting the record fails. The gateway
    /// is released again if the bridge cannot be set up.
    pub fn create(&self, driver: &str, subnet: Ipv4Network, name: &str) -> Result<Network> {
        if driver != BRIDGE_DRIVER {
            return Err(HutchError::config(format!("unsupported network driver {driver:?}")));
        }
        if Network::record_path(&self.config.network_dir, name).exists() {
            return Err(HutchError::config(format!("network {name} already exists")));
        }

        let ipam = self.ipam();
        let gateway = ipam.allocate(&subnet)?;
        let range = Ipv4Network::new(gateway, subnet.prefix())
            .map_err(|e| HutchError::config(format!("invalid subnet {subnet}: {e}")))?;
        let network = match self.driver().create(range, name) {
            Ok(network) => network,
            Err(e) => {
                if let Err(release) = ipam.release(&subnet, gateway) {
                    tracing::warn!(network = name, error = %release, "failed to release gateway");
                }
                return Err(e);
            }
        };
        network.save(&self.config.network_dir)?;
        Ok(network)
    }

    /// Every known network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network directory cannot be read.
    pub fn list(&self) -> Result<Vec<Network>> {
        Network::load_all(&self.config.network_dir)
    }

    /// Deletes network `name`: its gateway address, bridge and record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown network, or the bridge or record
    /// removal error.
    pub fn remove(&self, name: &str) -> Result<()> {
        let network = Network::load(&self.config.network_dir, name)?;
        if let Err(e) = self.ipam().release(&network.subnet(), network.gateway()) {
            tracing::warn!(network = name, error = %e, "failed to release gateway");
        }
        self.driver().delete(&network)?;
        Network::remove_record(&self.config.network_dir, name)?;
        tracing::info!(network = name, "network removed");
        Ok(())
    }

    /// Attaches the container whose init is `pid` to network `name`, and
    /// forwards `ports` to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the network is unknown or any wiring step fails.
    /// Whatever was set up is undone before returning.
    pub fn connect(
        &self,
        name: &str,
        id: &ContainerId,
        pid: u32,
        ports: &[PortMapping],
    ) -> Result<Endpoint> {
        let network = Network::load(&self.config.network_dir, name)?;
        let ipam = self.ipam();
        let ip = ipam.allocate(&network.subnet())?;
        let endpoint = Endpoint::new(id.as_str(), network, ip, ports.to_vec());

        if let Err(e) = self.wire(&endpoint, pid) {
            self.unwire(&endpoint);
            if let Err(release) = ipam.release(&endpoint.network.subnet(), ip) {
                tracing::warn!(ip = %ip, error = %release, "failed to release address");
            }
            return Err(e);
        }
        tracing::info!(id = %id, network = name, ip = %ip, "container connected");
        Ok(endpoint)
    }

    fn wire(&self, endpoint: &Endpoint, pid: u32) -> Result<()> {
        let network = &endpoint.network;
        self.driver().connect(network, endpoint)?;
        self.links.move_to_netns(&endpoint.device.peer, pid)?;
        self.links
            .configure_in_netns(pid, &endpoint.device.peer, &endpoint.cidr(), network.gateway())?;
        for port in &endpoint.port_mappings {
            self.links
                .iptables(&dnat(endpoint.ip, *port).args(RuleAction::Append))?;
        }
        Ok(())
    }

    fn unwire(&self, endpoint: &Endpoint) {
        for port in &endpoint.port_mappings {
            if let Err(e) = self
                .links
                .iptables(&dnat(endpoint.ip, *port).args(RuleAction::Delete))
            {
                tracing::warn!(port = %port, error = %e, "failed to delete port forwarding");
            }
        }
        self.driver().disconnect(&endpoint.id);
    }

    /// Detaches container `id` from network `name`: port forwarding, veth
    /// pair, and, when known, its address.
    ///
    /// Every step is attempted; failures are logged.
    pub fn disconnect(&self, name: &str, id: &ContainerId, ip: Option<Ipv4Addr>, ports: &[PortMapping]) {
        let network = match Network::load(&self.config.network_dir, name) {
            Ok(network) => network,
            Err(e) => {
                tracing::warn!(network = name, error = %e, "cannot disconnect from unknown network");
                self.driver().disconnect(&format!("{id}-{name}"));
                return;
            }
        };
        let Some(ip) = ip else {
            self.driver().disconnect(&format!("{id}-{name}"));
            return;
        };

        let endpoint = Endpoint::new(id.as_str(), network, ip, ports.to_vec());
        self.unwire(&endpoint);
        if let Err(e) = self.ipam().release(&endpoint.network.subnet(), ip) {
            tracing::warn!(ip = %ip, error = %e, "failed to release address");
        }
    }
}

const fn dnat(container_ip: Ipv4Addr, port: PortMapping) -> DnatRule {
    DnatRule {
        host_port: port.host_port,
        container_ip,
        container_port: port.container_port,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct FakeLinks {
        calls: RefCell<Vec<String>>,
        fail_configure: bool,
    }

    impl FakeLinks {
        fn record(&self, call: String) -> Result<()> {
            self.calls.borrow_mut().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl LinkOps for FakeLinks {
        fn link_exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn add_bridge(&self, name: &str) -> Result<()> {
            self.record(format!("bridge {name}"))
        }
        fn add_addr(&self, name: &str, addr: &Ipv4Network) -> Result<()> {
            self.record(format!("addr {name} {addr}"))
        }
        fn set_up(&self, name: &str) -> Result<()> {
            self.record(format!("up {name}"))
        }
        fn add_veth(&self, name: &str, peer: &str, master: &str) -> Result<()> {
            self.record(format!("veth {name} {peer} {master}"))
        }
        fn set_nomaster(&self, name: &str) -> Result<()> {
            self.record(format!("nomaster {name}"))
        }
        fn delete_link(&self, name: &str) -> Result<()> {
            self.record(format!("del {name}"))
        }
        fn move_to_netns(&self, name: &str, pid: u32) -> Result<()> {
            self.record(format!("netns {name} {pid}"))
        }
        fn configure_in_netns(&self, pid: u32, name: &str, addr: &Ipv4Network, gateway: Ipv4Addr) -> Result<()> {
            if self.fail_configure {
                return Err(HutchError::Command {
                    program: "ip",
                    message: "boom".into(),
                });
            }
            self.record(format!("configure {pid} {name} {addr} via {gateway}"))
        }
        fn iptables(&self, args: &[String]) -> Result<()> {
            self.record(format!("iptables {}", args.join(" ")))
        }
    }

    fn subnet() -> Ipv4Network {
        "172.18.0.0/24".parse().unwrap()
    }

    #[test]
    fn create_assigns_first_address_as_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let links = FakeLinks::default();
        let manager = NetworkManager::new(&config, &links);

        let network = manager.create("bridge", subnet(), "testbr").unwrap();
        assert_eq!(network.gateway(), Ipv4Addr::new(172, 18, 0, 1));
        assert!(links.calls().contains(&"addr testbr 172.18.0.1/24".to_string()));
        assert_eq!(manager.list().unwrap(), [network]);
    }

    #[test]
    fn create_rejects_unknown_driver_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let links = FakeLinks::default();
        let manager = NetworkManager::new(&config, &links);

        assert!(manager.create("macvlan", subnet(), "n").is_err());
        let _ = manager.create("bridge", subnet(), "n").unwrap();
        assert!(matches!(
            manager.create("bridge", subnet(), "n").unwrap_err(),
            HutchError::Config { .. }
        ));
    }

    #[test]
    fn connect_wires_endpoint_and_forwards_ports() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let links = FakeLinks::default();
        let manager = NetworkManager::new(&config, &links);
        let _ = manager.create("bridge", subnet(), "testbr").unwrap();

        let ports = ["8080:80".parse().unwrap()];
        let endpoint = manager
            .connect("testbr", &ContainerId::new("abcdef0123"), 99, &ports)
            .unwrap();
        assert_eq!(endpoint.ip, Ipv4Addr::new(172, 18, 0, 2));
        assert_eq!(endpoint.id, "abcdef0123-testbr");

        let calls = links.calls();
        assert!(calls.contains(&"veth abcde cif-abcde testbr".to_string()));
        assert!(calls.contains(&"netns cif-abcde 99".to_string()));
        assert!(calls.contains(&"configure 99 cif-abcde 172.18.0.2/24 via 172.18.0.1".to_string()));
        assert!(calls.iter().any(|c| c.contains("-A PREROUTING") && c.contains("172.18.0.2:80")));
    }

    #[test]
    fn failed_connect_releases_address() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let _ = NetworkManager::new(&config, &FakeLinks::default())
            .create("bridge", subnet(), "testbr")
            .unwrap();

        let failing = FakeLinks {
            fail_configure: true,
            ..FakeLinks::default()
        };
        let manager = NetworkManager::new(&config, &failing);
        assert!(manager.connect("testbr", &ContainerId::new("c1"), 1, &[]).is_err());
        assert!(failing.calls().contains(&"del c1-te".to_string()));

        let ok = FakeLinks::default();
        let endpoint = NetworkManager::new(&config, &ok)
            .connect("testbr", &ContainerId::new("c2"), 1, &[])
            .unwrap();
        assert_eq!(endpoint.ip, Ipv4Addr::new(172, 18, 0, 2));
    }

    #[test]
    fn remove_deletes_bridge_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let links = FakeLinks::default();
        let manager = NetworkManager::new(&config, &links);
        let _ = manager.create("bridge", subnet(), "testbr").unwrap();

        manager.remove("testbr").unwrap();
        assert!(manager.list().unwrap().is_empty());
        assert!(links.calls().contains(&"del testbr".to_string()));
        assert!(matches!(
            manager.remove("testbr").unwrap_err(),
            HutchError::NotFound { .. }
        ));
    }

    #[test]
    fn disconnect_releases_address_for_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let links = FakeLinks::default();
        let manager = NetworkManager::new(&config, &links);
        let _ = manager.create("bridge", subnet(), "testbr").unwrap();
        let id = ContainerId::new("c1");
        let endpoint = manager.connect("testbr", &id, 1, &[]).unwrap();

        manager.disconnect("testbr", &id, Some(endpoint.ip), &[]);
        let again = manager.connect("testbr", &ContainerId::new("c2"), 1, &[]).unwrap();
        assert_eq!(again.ip, endpoint.ip);
    }
}
