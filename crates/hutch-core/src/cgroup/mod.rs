//! Cgroup v1 resource management.
//!
//! A [`CgroupManager`] owns a hierarchy path (relative to every controller
//! mount) and walks the fixed [`Subsystem`] table to set limits, attach
//! processes, and tear the groups down again.
//!
//! Limit failures are deliberately not fatal: a controller that cannot be
//! configured is logged and skipped so the container still starts with the
//! remaining limits.

pub mod cpu;
pub mod cpuset;
pub mod memory;
pub mod mountinfo;

use std::io::Write;
use std::path::{Path, PathBuf};

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, ResourceLimits};

/// Name of the membership file inside every v1 cgroup directory.
const TASKS_FILE: &str = "tasks";

/// A cgroup v1 controller managed by Hutch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// `memory` controller.
    Memory,
    /// `cpu` controller (shares and CFS quota).
    Cpu,
    /// `cpuset` controller.
    Cpuset,
}

impl Subsystem {
    /// Every subsystem, in the order limits are applied.
    pub const ALL: [Self; 3] = [Self::Memory, Self::Cpu, Self::Cpuset];

    /// Kernel name of the controller.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Cpu => "cpu",
            Self::Cpuset => "cpuset",
        }
    }

    /// Whether `limits` asks anything of this controller.
    #[must_use]
    pub fn is_configured(self, limits: &ResourceLimits) -> bool {
        match self {
            Self::Memory => limits.memory().is_some(),
            Self::Cpu => limits.cpu_shares().is_some() || limits.cpu_quota_percent().is_some(),
            Self::Cpuset => limits.cpuset().is_some(),
        }
    }

    fn write_limits(self, dir: &Path, limits: &ResourceLimits) -> Result<()> {
        match self {
            Self::Memory => {
                if let Some(limit) = limits.memory() {
                    memory::set_limit(dir, limit)?;
                }
            }
            Self::Cpu => {
                if let Some(shares) = limits.cpu_shares() {
                    cpu::set_shares(dir, shares)?;
                }
                if let Some(percent) = limits.cpu_quota_percent() {
                    cpu::set_quota_percent(dir, percent)?;
                }
            }
            Self::Cpuset => {
                if let Some(cpus) = limits.cpuset() {
                    cpuset::set_cpus(dir, cpus)?;
                }
            }
        }
        Ok(())
    }
}

/// Handle to one cgroup path across all managed controllers.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// Path of the group relative to each controller mount.
    path: PathBuf,
    /// Mount table used to locate controller mounts.
    mountinfo: PathBuf,
}

impl CgroupManager {
    /// Creates a manager for an arbitrary hierarchy path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mountinfo: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mountinfo: mountinfo.into(),
        }
    }

    /// Creates the manager for a container's own group, `<cgroup_root>/<id>`.
    #[must_use]
    pub fn for_container(config: &HutchConfig, id: &ContainerId) -> Self {
        Self::new(config.cgroup_path(id.as_str()), &config.mountinfo)
    }

    /// Path of the group relative to each controller mount.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute directory of this group under the given controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is not mounted.
    pub fn subsystem_dir(&self, subsystem: Subsystem) -> Result<PathBuf> {
        let mount = mountinfo::find_mountpoint(&self.mountinfo, subsystem.name())?;
        Ok(mount.join(&self.path))
    }

    /// Creates the group directories and writes every requested limit.
    ///
    /// Controllers without a requested limit are left untouched. A failing
    /// controller is logged and the remaining ones are still configured.
    pub fn set(&self, limits: &ResourceLimits) {
        for subsystem in Subsystem::ALL {
            if !subsystem.is_configured(limits) {
                continue;
            }
            if let Err(e) = self.set_subsystem(subsystem, limits) {
                tracing::error!(subsystem = subsystem.name(), error = %e, "failed to set cgroup limit");
            }
        }
    }

    /// Creates the group under one controller and writes its limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is not mounted, the group already
    /// exists (a previous `set` was not followed by `destroy`), or a control
    /// file cannot be written.
    pub fn set_subsystem(&self, subsystem: Subsystem, limits: &ResourceLimits) -> Result<()> {
        let dir = self.subsystem_dir(subsystem)?;
        create_group_dir(&dir)?;
        subsystem.write_limits(&dir, limits)?;
        tracing::info!(subsystem = subsystem.name(), path = %dir.display(), "cgroup limits set");
        Ok(())
    }

    /// Moves `pid` into the group of every controller with a requested limit.
    ///
    /// Failures are logged per controller.
    pub fn apply(&self, pid: u32, limits: &ResourceLimits) {
        for subsystem in Subsystem::ALL {
            if !subsystem.is_configured(limits) {
                continue;
            }
            if let Err(e) = self.apply_subsystem(subsystem, pid) {
                tracing::error!(subsystem = subsystem.name(), pid, error = %e, "failed to add process to cgroup");
            }
        }
    }

    /// Appends `pid` to the controller's task membership file.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is not mounted or `tasks` cannot be
    /// written.
    pub fn apply_subsystem(&self, subsystem: Subsystem, pid: u32) -> Result<()> {
        let tasks = self.subsystem_dir(subsystem)?.join(TASKS_FILE);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&tasks)
            .map_err(|e| HutchError::io(&tasks, e))?;
        writeln!(file, "{pid}").map_err(|e| HutchError::io(&tasks, e))?;
        tracing::debug!(subsystem = subsystem.name(), pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the group under every controller.
    ///
    /// Runs regardless of whether `set` or `apply` succeeded. Unmounted
    /// controllers and missing directories are skipped; other failures are
    /// logged.
    pub fn destroy(&self) {
        for subsystem in Subsystem::ALL {
            let dir = match self.subsystem_dir(subsystem) {
                Ok(dir) => dir,
                Err(e) => {
                    tracing::debug!(subsystem = subsystem.name(), error = %e, "skipping cgroup removal");
                    continue;
                }
            };
            match remove_group_dir(&dir) {
                Ok(()) => tracing::info!(subsystem = subsystem.name(), path = %dir.display(), "cgroup destroyed"),
                Err(e) => tracing::warn!(subsystem = subsystem.name(), error = %e, "failed to remove cgroup"),
            }
        }
    }
}

/// Writes a single control file inside a cgroup directory.
pub(crate) fn write_control(cgroup_dir: &Path, file: &str, value: &str) -> Result<()> {
    let path = cgroup_dir.join(file);
    std::fs::write(&path, value).map_err(|e| HutchError::io(path, e))
}

fn create_group_dir(dir: &Path) -> Result<()> {
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HutchError::io(parent, e))?;
    }
    match std::fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(HutchError::config(format!(
            "cgroup {} already exists",
            dir.display()
        ))),
        Err(e) => Err(HutchError::io(dir, e)),
    }
}

/// Removes a group directory.
///
/// cgroupfs only accepts `rmdir` on a group (its control files cannot be
/// unlinked); a plain directory tree falls back to recursive removal.
fn remove_group_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) => std::fs::remove_dir_all(dir).map_err(|e| HutchError::io(dir, e)),
    }
}
