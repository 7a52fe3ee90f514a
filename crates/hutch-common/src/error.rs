//! Unified error type for the Hutch workspace.
//!
//! Library crates return [`HutchError`]; the CLI wraps it in `anyhow` at the
//! top level.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HutchError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or caller-supplied argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A privileged system call failed.
    #[error("system call failed: {message}")]
    Syscall {
        /// Description of the failed call, including the errno.
        message: String,
    },

    /// An external host tool (`ip`, `iptables`, `nsenter`) failed.
    #[error("{program} failed: {message}")]
    Command {
        /// Program that was invoked.
        program: &'static str,
        /// Exit status and captured stderr.
        message: String,
    },

    /// A volume specification is not of the form `hostPath:containerPath`.
    #[error("invalid volume {spec:?}: {reason}")]
    InvalidVolume {
        /// The rejected specification.
        spec: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Every address in a subnet is already allocated.
    #[error("no free address left in subnet {subnet}")]
    SubnetExhausted {
        /// The exhausted subnet in CIDR notation.
        subnet: String,
    },

    /// The operation requires the container to be stopped first.
    #[error("container {id} is running; stop it before removal or force remove")]
    ContainerRunning {
        /// Identifier of the running container.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HutchError {
    /// Builds an [`HutchError::Io`] for the given path.
    ///
    /// Intended for `map_err(|e| HutchError::io(&path, e))`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`HutchError::Config`] from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HutchError>;
