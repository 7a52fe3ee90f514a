//! Per-container root filesystem.
//!
//! Layout under `<overlay_root>/<id>/`:
//!
//! ```text
//! lower/   unpacked image (read-only layer, reused if present)
//! upper/   container writes
//! work/    overlay scratch space
//! merged/  the container's root
//! ```

use std::path::{Path, PathBuf};

use nix::mount::MntFlags;

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, VolumeSpec};
use hutch_core::filesystem::mount::{self, Mounter};
use hutch_core::filesystem::overlayfs::{self, OverlayConfig};
use hutch_image::storage::ImageStore;

/// A container's overlay directories and optional volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    overlay: OverlayConfig,
    volume: Option<VolumeSpec>,
}

impl Workspace {
    /// Describes the workspace of `id` without touching the filesystem.
    #[must_use]
    pub fn new(config: &HutchConfig, id: &ContainerId, volume: Option<VolumeSpec>) -> Self {
        let root = config.overlay_root.join(id.as_str());
        Self {
            overlay: OverlayConfig::under(&root),
            root,
            volume,
        }
    }

    /// The merged root filesystem path.
    #[must_use]
    pub fn merged(&self) -> &Path {
        &self.overlay.merged_dir
    }

    /// The bind target of the volume inside `merged`, if any.
    #[must_use]
    pub fn volume_target(&self) -> Option<PathBuf> {
        self.volume.as_ref().map(|v| {
            self.overlay
                .merged_dir
                .join(v.container_path.trim_start_matches('/'))
        })
    }

    /// Unpacks the image, mounts the overlay, and binds the volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is missing, extraction fails, or a mount
    /// fails. Whatever was already built is left for [`Workspace::delete`].
    pub fn create(&self, mounter: &dyn Mounter, images: &ImageStore, image: &str) -> Result<()> {
        let _ = images.unpack_into(image, &self.overlay.lower_dir)?;
        overlayfs::mount_overlay(mounter, &self.overlay)?;

        if let (Some(volume), Some(target)) = (&self.volume, self.volume_target()) {
            let host = Path::new(&volume.host_path);
            std::fs::create_dir_all(host).map_err(|e| HutchError::io(host, e))?;
            std::fs::create_dir_all(&target).map_err(|e| HutchError::io(&target, e))?;
            mount::bind_mount(mounter, host, &target)?;
            tracing::info!(host = %host.display(), target = %target.display(), "volume mounted");
        }

        tracing::info!(root = %self.root.display(), image, "workspace created");
        Ok(())
    }

    /// Unmounts and removes everything [`Workspace::create`] built.
    ///
    /// The volume is unmounted before the overlay so its host data is never
    /// removed through `merged`. Every step is attempted; failures are logged.
    /// If an unmount failed, `merged` and the workspace root are only removed
    /// when already empty, leaving the stale mounts in place.
    pub fn delete(&self, mounter: &dyn Mounter) {
        let mut unmounted = true;
        if let Some(target) = self.volume_target() {
            if let Err(e) = mounter.umount(&target, MntFlags::empty()) {
                tracing::warn!(target = %target.display(), error = %e, "failed to unmount volume");
                unmounted = false;
            }
        }
        if let Err(e) = overlayfs::unmount_overlay(mounter, &self.overlay.merged_dir) {
            tracing::warn!(error = %e, "failed to unmount overlay");
            unmounted = false;
        }

        for dir in [
            &self.overlay.upper_dir,
            &self.overlay.work_dir,
            &self.overlay.lower_dir,
        ] {
            log_removal(dir, std::fs::remove_dir_all(dir));
        }
        for dir in [&self.overlay.merged_dir, &self.root] {
            let removed = if unmounted {
                std::fs::remove_dir_all(dir)
            } else {
                std::fs::remove_dir(dir)
            };
            log_removal(dir, removed);
        }
        tracing::info!(root = %self.root.display(), "workspace deleted");
    }
}

fn log_removal(dir: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to remove directory"),
    }
}
