//! iptables NAT rule construction.
//!
//! Rules are built as argument vectors so the same rule can be appended and
//! later deleted with identical matching criteria.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// Whether a rule is being installed or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// `-A`: append to the chain.
    Append,
    /// `-D`: delete the first matching rule.
    Delete,
}

impl RuleAction {
    const fn flag(self) -> &'static str {
        match self {
            Self::Append => "-A",
            Self::Delete => "-D",
        }
    }
}

/// Source NAT for traffic leaving a bridge subnet through any other interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasqueradeRule {
    /// Bridge subnet.
    pub subnet: Ipv4Network,
    /// Bridge interface name.
    pub bridge: String,
}

impl MasqueradeRule {
    /// Creates the rule for a bridge and its subnet.
    ///
    /// Host bits of `subnet` are cleared so the rule matches the whole range.
    #[must_use]
    pub fn new(subnet: Ipv4Network, bridge: impl Into<String>) -> Self {
        let subnet = Ipv4Network::new(subnet.network(), subnet.prefix()).unwrap_or(subnet);
        Self {
            subnet,
            bridge: bridge.into(),
        }
    }

    /// `iptables` arguments for this rule.
    #[must_use]
    pub fn args(&self, action: RuleAction) -> Vec<String> {
        to_args(&[
            "-t",
            "nat",
            action.flag(),
            "POSTROUTING",
            "-s",
            &self.subnet.to_string(),
            "!",
            "-o",
            &self.bridge,
            "-j",
            "MASQUERADE",
        ])
    }
}

/// TCP port forwarding from a host port to a container address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnatRule {
    /// Port opened on the host.
    pub host_port: u16,
    /// Container address.
    pub container_ip: Ipv4Addr,
    /// Port inside the container.
    pub container_port: u16,
}

impl DnatRule {
    /// `iptables` arguments for this rule.
    #[must_use]
    pub fn args(&self, action: RuleAction) -> Vec<String> {
        to_args(&[
            "-t",
            "nat",
            action.flag(),
            "PREROUTING",
            "-p",
            "tcp",
            "-m",
            "tcp",
            "--dport",
            &self.host_port.to_string(),
            "-j",
            "DNAT",
            "--to-destination",
            &format!("{}:{}", self.container_ip, self.container_port),
        ])
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masquerade_rule_excludes_bridge_output() {
        let rule = MasqueradeRule::new("172.18.0.1/24".parse().unwrap(), "testbr");
        assert_eq!(
            rule.args(RuleAction::Append).join(" "),
            "-t nat -A POSTROUTING -s 172.18.0.0/24 ! -o testbr -j MASQUERADE"
        );
        assert_eq!(rule.args(RuleAction::Delete)[2], "-D");
    }

    #[test]
    fn dnat_rule_targets_container_socket() {
        let rule = DnatRule {
            host_port: 8080,
            container_ip: Ipv4Addr::new(172, 18, 0, 2),
            container_port: 80,
        };
        assert_eq!(
            rule.args(RuleAction::Append).join(" "),
            "-t nat -A PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 172.18.0.2:80"
        );
    }
}
