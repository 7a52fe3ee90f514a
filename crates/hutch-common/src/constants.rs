//! System-wide constants and default paths.

/// Default base directory for Hutch state and data.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/hutch";

/// Name of the per-runtime directory created under each cgroup controller.
pub const DEFAULT_CGROUP_ROOT: &str = "hutch";

/// Mount table of the calling process, used to locate cgroup controllers.
pub const DEFAULT_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Binary re-executed as the container init process.
pub const DEFAULT_INIT_BINARY: &str = "/proc/self/exe";

/// Hidden argument that turns the binary into the container init.
pub const INIT_ARG: &str = "init";

/// Descriptor number on which the init process receives its command.
///
/// 0-2 are the standard streams, so the first inherited extra descriptor is 3.
pub const INIT_PIPE_FD: i32 = 3;

/// File name of the per-container JSON record.
pub const RECORD_FILE: &str = "config.json";

/// Length of generated container identifiers.
pub const CONTAINER_ID_LEN: usize = 10;

/// Number of id characters used to name a veth device.
///
/// Interface names are limited to 15 bytes; `cif-` plus five characters fits.
pub const VETH_PREFIX_LEN: usize = 5;

/// Prefix of the container-side veth peer.
pub const VETH_PEER_PREFIX: &str = "cif-";

/// CFS scheduling period written alongside every CPU quota, in microseconds.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Timestamp layout used in container records.
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Name of the only network driver.
pub const BRIDGE_DRIVER: &str = "bridge";

/// Returns the log file name for a detached container.
#[must_use]
pub fn log_file_name(container_id: &str) -> String {
    format!("{container_id}-json.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_uses_json_suffix() {
        assert_eq!(log_file_name("0123456789"), "0123456789-json.log");
    }

    #[test]
    fn veth_peer_name_fits_interface_limit() {
        assert!(VETH_PEER_PREFIX.len() + VETH_PREFIX_LEN <= 15);
    }
}
