//! CPU pinning via the cgroup v1 `cpuset` controller.

use std::path::Path;

use hutch_common::error::Result;

use super::write_control;

/// Restricts the cgroup to the given CPU list, e.g. `0-1,3`.
///
/// # Errors
///
/// Returns an error if writing to `cpuset.cpus` fails.
pub fn set_cpus(cgroup_dir: &Path, cpus: &str) -> Result<()> {
    write_control(cgroup_dir, "cpuset.cpus", cpus)?;
    tracing::debug!(cpus, "cpuset set");
    Ok(())
}
