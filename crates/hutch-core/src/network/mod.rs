//! Container networking: address allocation and bridge/veth wiring.

pub mod bridge;
pub mod firewall;
pub mod ipam;
pub mod link;

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use hutch_common::constants::{VETH_PEER_PREFIX, VETH_PREFIX_LEN};
use hutch_common::error::{HutchError, Result};
use hutch_common::types::PortMapping;

/// A named bridge network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name, also used as the bridge interface name.
    pub name: String,
    /// Subnet whose address part is the gateway, e.g. `172.18.0.1/24`.
    pub ip_range: Ipv4Network,
    /// Driver that manages the network.
    pub driver: String,
}

impl Network {
    /// Gateway address (the bridge's own address).
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.ip_range.ip()
    }

    /// The subnet with host bits cleared.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip_range.network(), self.ip_range.prefix()).unwrap_or(self.ip_range)
    }

    /// Path of this network's record inside `dir`.
    #[must_use]
    pub fn record_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    /// Writes the record to `<dir>/<name>.json`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| HutchError::io(dir, e))?;
        let path = Self::record_path(dir, &self.name);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| HutchError::io(path, e))
    }

    /// Reads the record of a named network.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record exists, or an error if it cannot be
    /// read or parsed.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = Self::record_path(dir, name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HutchError::NotFound {
                    kind: "network",
                    id: name.to_string(),
                });
            }
            Err(e) => return Err(HutchError::io(path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Reads every network record in `dir`, sorted by name.
    ///
    /// A missing directory yields no networks.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a record cannot be read.
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HutchError::io(dir, e)),
        };
        let mut networks = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| HutchError::io(dir, e))?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| HutchError::io(&path, e))?;
            networks.push(serde_json::from_str::<Self>(&content)?);
        }
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    /// Removes the record of a named network. A missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove_record(dir: &Path, name: &str) -> Result<()> {
        let path = Self::record_path(dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HutchError::io(path, e)),
        }
    }
}

/// Names of the two ends of a veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Host end, attached to the bridge.
    pub name: String,
    /// Container end, moved into the container's network namespace.
    pub peer: String,
}

impl VethPair {
    /// Derives the pair from an endpoint id: the host end is the id's first
    /// few characters, the peer adds the `cif-` prefix.
    ///
    /// Distinct ids sharing a prefix map to the same pair.
    #[must_use]
    pub fn for_endpoint(endpoint_id: &str) -> Self {
        let name: String = endpoint_id.chars().take(VETH_PREFIX_LEN).collect();
        let peer = format!("{VETH_PEER_PREFIX}{name}");
        Self { name, peer }
    }
}

/// A container's attachment to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `<container-id>-<network>`.
    pub id: String,
    /// Veth device pair.
    pub device: VethPair,
    /// Address allocated to the container.
    pub ip: Ipv4Addr,
    /// Network the endpoint belongs to.
    pub network: Network,
    /// Host ports forwarded to the container.
    pub port_mappings: Vec<PortMapping>,
}

impl Endpoint {
    /// Builds the endpoint of `container_id` on `network`.
    #[must_use]
    pub fn new(
        container_id: &str,
        network: Network,
        ip: Ipv4Addr,
        port_mappings: Vec<PortMapping>,
    ) -> Self {
        let id = format!("{container_id}-{}", network.name);
        let device = VethPair::for_endpoint(&id);
        Self {
            id,
            device,
            ip,
            network,
            port_mappings,
        }
    }

    /// The container address with the network's prefix length.
    #[must_use]
    pub fn cidr(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip, self.network.ip_range.prefix()).unwrap_or(self.network.ip_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network {
            name: "testbr".into(),
            ip_range: "172.18.0.1/24".parse().unwrap(),
            driver: "bridge".into(),
        }
    }

    #[test]
    fn gateway_and_subnet_derive_from_range() {
        let n = network();
        assert_eq!(n.gateway(), Ipv4Addr::new(172, 18, 0, 1));
        assert_eq!(n.subnet().to_string(), "172.18.0.0/24");
    }

    #[test]
    fn endpoint_names_follow_container_id() {
        let ep = Endpoint::new("0123456789", network(), Ipv4Addr::new(172, 18, 0, 2), vec![]);
        assert_eq!(ep.id, "0123456789-testbr");
        assert_eq!(ep.device.name, "01234");
        assert_eq!(ep.device.peer, "cif-01234");
        assert_eq!(ep.cidr().to_string(), "172.18.0.2/24");
    }

    #[test]
    fn records_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let n = network();
        n.save(dir.path()).unwrap();
        assert_eq!(Network::load(dir.path(), "testbr").unwrap(), n);
        assert_eq!(Network::load_all(dir.path()).unwrap(), vec![n]);

        Network::remove_record(dir.path(), "testbr").unwrap();
        assert!(matches!(
            Network::load(dir.path(), "testbr"),
            Err(HutchError::NotFound { .. })
        ));
        Network::remove_record(dir.path(), "testbr").unwrap();
    }

    #[test]
    fn missing_network_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Network::load_all(&dir.path().join("absent")).unwrap().is_empty());
    }
}
