//! `OverlayFS` management for layered container filesystems.
//!
//! A read-only lower layer (the extracted image) is stacked under a writable
//! upper layer, giving each container a copy-on-write view at `merged`.

use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};

use hutch_common::error::{HutchError, Result};

use super::mount::Mounter;

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Read-only lower layer.
    pub lower_dir: PathBuf,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Lays out `lower`, `upper`, `work` and `merged` under one container root.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            lower_dir: root.join("lower"),
            upper_dir: root.join("upper"),
            work_dir: root.join("work"),
            merged_dir: root.join("merged"),
        }
    }

    /// Mount data string passed to the kernel.
    #[must_use]
    pub fn options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower_dir.display(),
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist.
///
/// # Errors
///
/// Returns an error if directory creation fails or if the mount fails.
pub fn mount_overlay(mounter: &dyn Mounter, config: &OverlayConfig) -> Result<()> {
    for dir in [&config.upper_dir, &config.work_dir, &config.merged_dir] {
        std::fs::create_dir_all(dir).map_err(|e| HutchError::io(dir, e))?;
    }

    let opts = config.options();
    mounter.mount(
        Some(Path::new("overlay")),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Unmounts an `OverlayFS` at the given path.
///
/// # Errors
///
/// Returns an error if the unmount fails.
pub fn unmount_overlay(mounter: &dyn Mounter, merged_dir: &Path) -> Result<()> {
    mounter.umount(merged_dir, MntFlags::MNT_DETACH)?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::mount::testing::{Call, RecordingMounter};
    use super::*;

    #[test]
    fn options_list_all_three_layers() {
        let cfg = OverlayConfig::under(Path::new("/var/lib/hutch/overlay2/abc"));
        assert_eq!(
            cfg.options(),
            "lowerdir=/var/lib/hutch/overlay2/abc/lower,\
             upperdir=/var/lib/hutch/overlay2/abc/upper,\
             workdir=/var/lib/hutch/overlay2/abc/work"
        );
    }

    #[test]
    fn mount_creates_writable_dirs_and_mounts_on_merged() {
        let root = tempfile::tempdir().unwrap();
        let cfg = OverlayConfig::under(root.path());
        let m = RecordingMounter::default();
        mount_overlay(&m, &cfg).unwrap();

        assert!(cfg.upper_dir.is_dir());
        assert!(cfg.work_dir.is_dir());
        assert!(cfg.merged_dir.is_dir());
        assert_eq!(
            m.calls(),
            vec![Call::Mount {
                source: Some("overlay".into()),
                target: cfg.merged_dir.clone(),
                fstype: Some("overlay".into()),
                flags: MsFlags::empty(),
                data: Some(cfg.options()),
            }]
        );
    }
}
