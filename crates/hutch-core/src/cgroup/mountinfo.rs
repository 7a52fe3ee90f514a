//! Controller mount point discovery.
//!
//! Each cgroup v1 controller is mounted separately; its mount point is found
//! by scanning the process mount table, e.g.
//!
//! ```text
//! 47 36 0:41 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec shared:21 - cgroup cgroup rw,memory
//! ```
//!
//! where the last field lists the super options (which name the controller)
//! and the fifth field is the mount point.

use std::path::{Path, PathBuf};

use hutch_common::error::{HutchError, Result};

/// Index of the mount point column in a mountinfo line.
const MOUNT_POINT_FIELD: usize = 4;

/// Returns the mount point of the named cgroup controller.
///
/// # Errors
///
/// Returns an error if the mount table cannot be read or no mount lists the
/// controller among its options.
pub fn find_mountpoint(mountinfo: &Path, controller: &str) -> Result<PathBuf> {
    let table = std::fs::read_to_string(mountinfo).map_err(|e| HutchError::io(mountinfo, e))?;
    parse_mountpoint(&table, controller).ok_or_else(|| HutchError::NotFound {
        kind: "cgroup controller mount",
        id: controller.to_string(),
    })
}

fn parse_mountpoint(table: &str, controller: &str) -> Option<PathBuf> {
    table.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let options = fields.last()?;
        if options.split(',').any(|opt| opt == controller) {
            fields.get(MOUNT_POINT_FIELD).map(PathBuf::from)
        } else {
            None
        }
    })
}
