//! Bitmap IP address allocation.
//!
//! Each subnet is tracked as a string of `'0'`/`'1'` characters, one per
//! address, where index `i` stands for `network + i`. The network and
//! broadcast addresses are marked allocated when the subnet is first seen.
//! The whole map is persisted as one JSON object keyed by CIDR.
//!
//! There is no locking: concurrent invocations may race on the state file.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnetwork::Ipv4Network;

use hutch_common::error::{HutchError, Result};

/// Longest prefix that still leaves a usable host address.
const MAX_PREFIX: u8 = 30;

/// Shortest prefix accepted; a /8 bitmap is already 16 MiB of state.
const MIN_PREFIX: u8 = 8;

const FREE: u8 = b'0';
const TAKEN: u8 = b'1';

type Subnets = BTreeMap<String, String>;

/// Address allocator backed by a JSON state file.
#[derive(Debug, Clone)]
pub struct Ipam {
    path: PathBuf,
}

impl Ipam {
    /// Creates an allocator persisting its state at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocates the lowest free address in `subnet`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is outside /8 to /30, every address is
    /// taken, or the state file cannot be read or written.
    pub fn allocate(&self, subnet: &Ipv4Network) -> Result<Ipv4Addr> {
        let subnet = normalize(subnet)?;
        let key = subnet.to_string();
        let mut subnets = self.load()?;

        let bitmap = subnets
            .entry(key.clone())
            .or_insert_with(|| fresh_bitmap(subnet.prefix()));
        let mut bits = std::mem::take(bitmap).into_bytes();
        let Some(index) = bits.iter().position(|b| *b == FREE) else {
            *bitmap = String::from_utf8_lossy(&bits).into_owned();
            return Err(HutchError::SubnetExhausted { subnet: key });
        };
        bits[index] = TAKEN;
        *bitmap = String::from_utf8_lossy(&bits).into_owned();

        let ip = offset(subnet.network(), index)?;
        self.dump(&subnets)?;
        tracing::debug!(subnet = %key, ip = %ip, "allocated address");
        Ok(ip)
    }

    /// Marks `ip` free again in `subnet`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subnet was never allocated from, `ip` lies
    /// outside it or is its network/broadcast address, or the state file
    /// cannot be read or written.
    pub fn release(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<()> {
        let subnet = normalize(subnet)?;
        let key = subnet.to_string();
        if !subnet.contains(ip) {
            return Err(HutchError::config(format!("{ip} is not in subnet {key}")));
        }
        if ip == subnet.network() || ip == subnet.broadcast() {
            return Err(HutchError::config(format!(
                "{ip} is a reserved address of subnet {key}"
            )));
        }

        let mut subnets = self.load()?;
        let bitmap = subnets.get_mut(&key).ok_or_else(|| HutchError::NotFound {
            kind: "subnet",
            id: key.clone(),
        })?;
        let index = usize::try_from(u32::from(ip) - u32::from(subnet.network()))
            .map_err(|_| HutchError::config(format!("{ip} is out of range")))?;
        let mut bits = std::mem::take(bitmap).into_bytes();
        if let Some(bit) = bits.get_mut(index) {
            *bit = FREE;
        }
        *bitmap = String::from_utf8_lossy(&bits).into_owned();

        self.dump(&subnets)?;
        tracing::debug!(subnet = %key, ip = %ip, "released address");
        Ok(())
    }

    fn load(&self) -> Result<Subnets> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Subnets::new()),
            Err(e) => Err(HutchError::io(&self.path, e)),
        }
    }

    fn dump(&self, subnets: &Subnets) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HutchError::io(parent, e))?;
        }
        let json = serde_json::to_string(subnets)?;
        std::fs::write(&self.path, json).map_err(|e| HutchError::io(&self.path, e))
    }
}

/// Rebuilds the network so `192.168.1.7/24` and `192.168.1.0/24` share a key.
fn normalize(subnet: &Ipv4Network) -> Result<Ipv4Network> {
    if subnet.prefix() > MAX_PREFIX {
        return Err(HutchError::config(format!(
            "subnet {subnet} has no usable host addresses"
        )));
    }
    if subnet.prefix() < MIN_PREFIX {
        return Err(HutchError::config(format!(
            "subnet {subnet} is too large, the shortest prefix is /{MIN_PREFIX}"
        )));
    }
    Ipv4Network::new(subnet.network(), subnet.prefix())
        .map_err(|e| HutchError::config(format!("invalid subnet {subnet}: {e}")))
}

fn fresh_bitmap(prefix: u8) -> String {
    let size = 1_usize << (32 - u32::from(prefix));
    format!("1{}1", "0".repeat(size - 2))
}

fn offset(base: Ipv4Addr, index: usize) -> Result<Ipv4Addr> {
    u32::try_from(index)
        .ok()
        .and_then(|i| u32::from(base).checked_add(i))
        .map(Ipv4Addr::from)
        .ok_or_else(|| HutchError::config(format!("address {base} + {index} overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipam() -> (tempfile::TempDir, Ipam) {
        let dir = tempfile::tempdir().unwrap();
        let ipam = Ipam::new(dir.path().join("network/ipam/subnet.json"));
        (dir, ipam)
    }

    fn net(cidr: &str) -> Ipv4Network {
        cidr.parse().unwrap()
    }

    #[test]
    fn allocates_sequentially_from_first_host() {
        let (_dir, ipam) = ipam();
        let subnet = net("192.168.1.0/24");
        assert_eq!(ipam.allocate(&subnet).unwrap(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(ipam.allocate(&subnet).unwrap(), Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn state_file_has_reserved_ends() {
        let (_dir, ipam) = ipam();
        let _ = ipam.allocate(&net("10.0.0.0/29")).unwrap();
        let raw = std::fs::read_to_string(ipam.path()).unwrap();
        let state: Subnets = serde_json::from_str(&raw).unwrap();
        assert_eq!(state["10.0.0.0/29"], "11000001");
    }

    #[test]
    fn host_bits_in_key_are_normalized() {
        let (_dir, ipam) = ipam();
        assert_eq!(
            ipam.allocate(&net("192.168.1.1/24")).unwrap(),
            Ipv4Addr::new(192, 168, 1, 1)
        );
        assert_eq!(
            ipam.allocate(&net("192.168.1.0/24")).unwrap(),
            Ipv4Addr::new(192, 168, 1, 2)
        );
    }

    fn bitmap_of(ipam: &Ipam, cidr: &str) -> String {
        let raw = std::fs::read_to_string(ipam.path()).unwrap();
        let state: Subnets = serde_json::from_str(&raw).unwrap();
        state[cidr].clone()
    }

    #[test]
    fn release_makes_address_reusable() {
        let (_dir, ipam) = ipam();
        let subnet = net("172.18.0.0/24");
        let a = ipam.allocate(&subnet).unwrap();
        let b = ipam.allocate(&subnet).unwrap();
        ipam.release(&subnet, a).unwrap();
        assert_eq!(ipam.allocate(&subnet).unwrap(), a);
        assert_ne!(ipam.allocate(&subnet).unwrap(), b);
    }

    #[test]
    fn release_restores_the_bitmap() {
        let (_dir, ipam) = ipam();
        let subnet = net("10.0.0.0/28");
        let _ = ipam.allocate(&subnet).unwrap();
        let before = bitmap_of(&ipam, "10.0.0.0/28");

        let ip = ipam.allocate(&subnet).unwrap();
        assert_ne!(bitmap_of(&ipam, "10.0.0.0/28"), before);
        ipam.release(&subnet, ip).unwrap();
        assert_eq!(bitmap_of(&ipam, "10.0.0.0/28"), before);
    }

    #[test]
    fn carries_across_octets() {
        let (_dir, ipam) = ipam();
        let subnet = net("10.1.0.0/16");
        let mut last = Ipv4Addr::UNSPECIFIED;
        for _ in 0..256 {
            last = ipam.allocate(&subnet).unwrap();
        }
        assert_eq!(last, Ipv4Addr::new(10, 1, 1, 0));
    }

    #[test]
    fn never_hands_out_network_or_broadcast_and_exhausts() {
        let (_dir, ipam) = ipam();
        let subnet = net("10.0.0.0/30");
        let a = ipam.allocate(&subnet).unwrap();
        let b = ipam.allocate(&subnet).unwrap();
        assert_eq!((a, b), (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)));
        let err = ipam.allocate(&subnet).unwrap_err();
        assert!(matches!(err, HutchError::SubnetExhausted { .. }));
    }

    #[test]
    fn rejects_subnets_without_hosts() {
        let (_dir, ipam) = ipam();
        assert!(ipam.allocate(&net("10.0.0.0/31")).is_err());
        assert!(ipam.allocate(&net("10.0.0.1/32")).is_err());
    }

    #[test]
    fn rejects_oversized_subnets_without_writing_state() {
        let (_dir, ipam) = ipam();
        for cidr in ["0.0.0.0/0", "0.0.0.0/1", "10.0.0.0/7"] {
            let err = ipam.allocate(&net(cidr)).unwrap_err();
            assert!(matches!(err, HutchError::Config { .. }), "{cidr}");
        }
        assert!(!ipam.path().exists());
    }

    #[test]
    fn release_rejects_bad_addresses() {
        let (_dir, ipam) = ipam();
        let subnet = net("10.0.0.0/24");
        assert!(matches!(
            ipam.release(&subnet, Ipv4Addr::new(10, 0, 0, 5)),
            Err(HutchError::NotFound { .. })
        ));
        let _ = ipam.allocate(&subnet).unwrap();
        assert!(ipam.release(&subnet, Ipv4Addr::new(10, 0, 1, 5)).is_err());
        assert!(ipam.release(&subnet, Ipv4Addr::new(10, 0, 0, 0)).is_err());
        assert!(ipam.release(&subnet, Ipv4Addr::new(10, 0, 0, 255)).is_err());
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let (dir, ipam) = ipam();
        std::fs::create_dir_all(dir.path().join("network/ipam")).unwrap();
        std::fs::write(ipam.path(), "not json").unwrap();
        assert!(ipam.allocate(&net("10.0.0.0/24")).is_err());
    }
}
