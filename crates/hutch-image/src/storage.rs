//! Local image store.
//!
//! Images are flat archives at `<image_dir>/<name>.tar`. Unpacked copies live
//! in each container's `lower` directory and are reused when already present.

use std::path::{Path, PathBuf};

use hutch_common::error::{HutchError, Result};

use crate::layer;

/// Manages the image archive directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    /// Directory holding `<name>.tar` archives.
    root: PathBuf,
}

impl ImageStore {
    /// Opens the store rooted at `root`. The directory need not exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root storage path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an image's archive.
    #[must_use]
    pub fn archive_path(&self, image: &str) -> PathBuf {
        self.root.join(format!("{image}.tar"))
    }

    /// Unpacks `image` into `lower` unless `lower` already exists.
    ///
    /// Returns `true` if the archive was extracted, `false` on a cache hit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image archive does not exist, or an error if
    /// extraction fails. A failed extraction removes the partial `lower`.
    pub fn unpack_into(&self, image: &str, lower: &Path) -> Result<bool> {
        if lower.exists() {
            tracing::debug!(image, lower = %lower.display(), "image already unpacked");
            return Ok(false);
        }
        let archive = self.archive_path(image);
        if !archive.is_file() {
            return Err(HutchError::NotFound {
                kind: "image",
                id: image.to_string(),
            });
        }
        if let Err(e) = layer::extract_layer(&archive, lower) {
            if let Err(cleanup) = std::fs::remove_dir_all(lower) {
                tracing::warn!(lower = %lower.display(), error = %cleanup, "failed to remove partial layer");
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Packs `rootfs` into a new image archive named `image`.
    ///
    /// An existing archive of the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `rootfs` is not a directory, or an error if the
    /// archive cannot be written.
    pub fn commit(&self, rootfs: &Path, image: &str) -> Result<PathBuf> {
        if !rootfs.is_dir() {
            return Err(HutchError::NotFound {
                kind: "container root filesystem",
                id: rootfs.display().to_string(),
            });
        }
        let archive = self.archive_path(image);
        layer::pack_layer(rootfs, &archive)?;
        tracing::info!(image, archive = %archive.display(), "image committed");
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_image(dir: &Path) -> ImageStore {
        let store = ImageStore::new(dir.join("image"));
        let rootfs = dir.join("rootfs");
        std::fs::create_dir_all(rootfs.join("bin")).expect("mkdir");
        std::fs::write(rootfs.join("bin/sh"), "#!").expect("write");
        let _ = store.commit(&rootfs, "busybox").expect("commit");
        store
    }

    #[test]
    fn archive_path_uses_tar_suffix() {
        let store = ImageStore::new("/var/lib/hutch/image");
        assert_eq!(
            store.archive_path("busybox"),
            Path::new("/var/lib/hutch/image/busybox.tar")
        );
    }

    #[test]
    fn unpack_extracts_then_hits_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_with_image(dir.path());
        let lower = dir.path().join("overlay2/c1/lower");

        assert!(store.unpack_into("busybox", &lower).expect("first unpack"));
        assert!(lower.join("bin/sh").is_file());

        std::fs::remove_file(store.archive_path("busybox")).expect("rm archive");
        assert!(!store.unpack_into("busybox", &lower).expect("cached unpack"));
    }

    #[test]
    fn unpack_missing_image_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path().join("image"));
        let lower = dir.path().join("lower");
        let err = store.unpack_into("nope", &lower).expect_err("missing");
        assert!(matches!(err, HutchError::NotFound { kind: "image", .. }));
        assert!(!lower.exists());
    }

    #[test]
    fn corrupt_archive_leaves_no_partial_lower() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path().join("image"));
        std::fs::create_dir_all(store.root()).expect("mkdir");
        std::fs::write(store.archive_path("broken"), [0x1f, 0x8b, 0, 1, 2, 3]).expect("write");

        let lower = dir.path().join("lower");
        assert!(store.unpack_into("broken", &lower).is_err());
        assert!(!lower.exists());
    }

    #[test]
    fn commit_requires_existing_rootfs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path().join("image"));
        assert!(store.commit(&dir.path().join("merged"), "snap").is_err());
    }
}
