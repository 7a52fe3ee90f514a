//! Memory resource control via the cgroup v1 `memory` controller.

use std::path::Path;

use hutch_common::error::Result;

use super::write_control;

/// Sets the hard memory limit for a cgroup.
///
/// The limit string (`100m`, `1g`, a byte count) is passed through unchanged.
///
/// # Errors
///
/// Returns an error if writing to `memory.limit_in_bytes` fails.
pub fn set_limit(cgroup_dir: &Path, limit: &str) -> Result<()> {
    write_control(cgroup_dir, "memory.limit_in_bytes", limit)?;
    tracing::debug!(limit, "memory limit set");
    Ok(())
}
