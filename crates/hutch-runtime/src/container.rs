//! Container records and their lifecycle transitions.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use hutch_common::constants::CREATED_FORMAT;
use hutch_common::types::{ContainerId, ContainerStatus, PortMapping};

/// Persistent description of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Unique identifier.
    pub id: ContainerId,
    /// Host pid of the init process while running.
    pub pid: Option<u32>,
    /// Human-readable name; the id when none was given.
    pub name: String,
    /// Command line, space-joined.
    pub command: String,
    /// Local creation time, `YYYY-MM-DD HH:MM:SS`.
    pub created: String,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// Image the container was started from.
    pub image: String,
    /// `hostPath:containerPath` volume request.
    pub volume: Option<String>,
    /// Network the container is attached to.
    pub network: Option<String>,
    /// Forwarded ports.
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
    /// Address assigned on `network`.
    pub ip: Option<Ipv4Addr>,
}

impl ContainerRecord {
    /// Creates the record of a container whose init just started.
    #[must_use]
    pub fn running(id: ContainerId, pid: u32, name: Option<String>, command: &[String], image: &str) -> Self {
        Self {
            name: name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.to_string()),
            id,
            pid: Some(pid),
            command: command.join(" "),
            created: chrono::Local::now().format(CREATED_FORMAT).to_string(),
            status: ContainerStatus::Running,
            image: image.to_string(),
            volume: None,
            network: None,
            port_mappings: Vec::new(),
            ip: None,
        }
    }

    /// Whether the record claims a live init process.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    /// Marks the container stopped by request.
    pub fn mark_stopped(&mut self) {
        self.status = ContainerStatus::Stopped;
        self.pid = None;
    }

    /// Marks the container as having exited on its own.
    pub fn mark_exited(&mut self) {
        self.status = ContainerStatus::Exited;
        self.pid = None;
    }
}
