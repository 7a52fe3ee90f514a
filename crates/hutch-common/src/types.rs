//! Domain primitive types used across the Hutch workspace.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::CONTAINER_ID_LEN;
use crate::error::{HutchError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID of [`CONTAINER_ID_LEN`] hex characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(CONTAINER_ID_LEN);
        Self(id)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container as persisted in its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The init process is (believed to be) alive.
    Running,
    /// The container was stopped through `hutch stop`.
    Stopped,
    /// The init process exited on its own.
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Resource limits requested for a container run.
///
/// Values are kept as the raw strings the kernel expects; an empty string
/// means the same as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit, e.g. `100m`.
    pub memory: Option<String>,
    /// CPU quota as a percentage of one CPU.
    pub cpu_quota_percent: Option<u64>,
    /// Relative CPU shares.
    pub cpu_shares: Option<String>,
    /// CPU list, e.g. `0-1,3`.
    pub cpuset: Option<String>,
}

impl ResourceLimits {
    /// Memory limit, if one was given.
    #[must_use]
    pub fn memory(&self) -> Option<&str> {
        non_empty(self.memory.as_deref())
    }

    /// CPU shares, if given.
    #[must_use]
    pub fn cpu_shares(&self) -> Option<&str> {
        non_empty(self.cpu_shares.as_deref())
    }

    /// CPU quota percent, if given and non-zero.
    #[must_use]
    pub fn cpu_quota_percent(&self) -> Option<u64> {
        self.cpu_quota_percent.filter(|p| *p > 0)
    }

    /// CPU list, if given.
    #[must_use]
    pub fn cpuset(&self) -> Option<&str> {
        non_empty(self.cpuset.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// A `hostPath:containerPath` bind-mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Directory on the host.
    pub host_path: String,
    /// Directory inside the container.
    pub container_path: String,
}

impl FromStr for VolumeSpec {
    type Err = HutchError;

    fn from_str(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let [host, container] = parts.as_slice() else {
            return Err(HutchError::InvalidVolume {
                spec: spec.to_string(),
                reason: "expected exactly one ':'",
            });
        };
        if host.is_empty() || container.is_empty() {
            return Err(HutchError::InvalidVolume {
                spec: spec.to_string(),
                reason: "path cannot be empty",
            });
        }
        if Path::new(container)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(HutchError::InvalidVolume {
                spec: spec.to_string(),
                reason: "container path cannot contain '..'",
            });
        }
        Ok(Self {
            host_path: (*host).to_string(),
            container_path: (*container).to_string(),
        })
    }
}

/// A `hostPort:containerPort` TCP forwarding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port opened on the host.
    pub host_port: u16,
    /// Port inside the container.
    pub container_port: u16,
}

impl FromStr for PortMapping {
    type Err = HutchError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid =
            || HutchError::config(format!("invalid port mapping {spec:?}, expected HOST:CONTAINER"));
        let (host, container) = spec.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            host_port: host.parse().map_err(|_| invalid())?,
            container_port: container.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}
