//! CPU resource control via the cgroup v1 `cpu` controller.
//!
//! Manages `cpu.shares`, `cpu.cfs_period_us`, and `cpu.cfs_quota_us`.

use std::path::Path;

use hutch_common::constants::CPU_PERIOD_US;
use hutch_common::error::Result;

use super::write_control;

/// Sets the relative CPU weight for a cgroup.
///
/// The value is written verbatim; the kernel validates it.
///
/// # Errors
///
/// Returns an error if writing to `cpu.shares` fails.
pub fn set_shares(cgroup_dir: &Path, shares: &str) -> Result<()> {
    write_control(cgroup_dir, "cpu.shares", shares)?;
    tracing::debug!(shares, "CPU shares set");
    Ok(())
}

/// Limits the cgroup to `percent` of one CPU.
///
/// Writes the fixed period and a quota of `period * percent / 100`.
///
/// # Errors
///
/// Returns an error if writing either CFS control file fails.
pub fn set_quota_percent(cgroup_dir: &Path, percent: u64) -> Result<()> {
    let quota_us = quota_for_percent(percent);
    write_control(cgroup_dir, "cpu.cfs_period_us", &CPU_PERIOD_US.to_string())?;
    write_control(cgroup_dir, "cpu.cfs_quota_us", &quota_us.to_string())?;
    tracing::debug!(quota_us, period_us = CPU_PERIOD_US, "CPU quota set");
    Ok(())
}

/// Quota in microseconds for the given percentage of one CPU.
#[must_use]
pub const fn quota_for_percent(percent: u64) -> u64 {
    CPU_PERIOD_US * percent / 100
}
