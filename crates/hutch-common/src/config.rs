//! Runtime configuration.
//!
//! A single [`HutchConfig`] is built at startup and handed to every
//! collaborator; nothing in the workspace reads global path state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HutchError, Result};

/// Root configuration for the Hutch runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HutchConfig {
    /// Base directory for Hutch state and data.
    pub data_dir: PathBuf,
    /// Directory holding `<image>.tar` archives.
    pub image_dir: PathBuf,
    /// Directory holding `<id>/{lower,upper,work,merged}`.
    pub overlay_root: PathBuf,
    /// Directory holding `<id>/config.json` and detached logs.
    pub containers_dir: PathBuf,
    /// IPAM state file.
    pub ipam_file: PathBuf,
    /// Directory holding `<network>.json` records.
    pub network_dir: PathBuf,
    /// Directory created below each cgroup controller mount.
    pub cgroup_root: String,
    /// Mount table scanned for cgroup controller mount points.
    pub mountinfo: PathBuf,
    /// Binary re-executed as the container init.
    pub init_binary: PathBuf,
}

/// On-disk form of [`HutchConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    image_dir: Option<PathBuf>,
    overlay_root: Option<PathBuf>,
    containers_dir: Option<PathBuf>,
    ipam_file: Option<PathBuf>,
    network_dir: Option<PathBuf>,
    cgroup_root: Option<String>,
    mountinfo: Option<PathBuf>,
    init_binary: Option<PathBuf>,
}

impl ConfigFile {
    fn resolve(self) -> HutchConfig {
        let base = HutchConfig::from_data_dir(
            self.data_dir
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_DATA_DIR)),
        );
        HutchConfig {
            image_dir: self.image_dir.unwrap_or(base.image_dir),
            overlay_root: self.overlay_root.unwrap_or(base.overlay_root),
            containers_dir: self.containers_dir.unwrap_or(base.containers_dir),
            ipam_file: self.ipam_file.unwrap_or(base.ipam_file),
            network_dir: self.network_dir.unwrap_or(base.network_dir),
            cgroup_root: self.cgroup_root.unwrap_or(base.cgroup_root),
            mountinfo: self.mountinfo.unwrap_or(base.mountinfo),
            init_binary: self.init_binary.unwrap_or(base.init_binary),
            data_dir: base.data_dir,
        }
    }
}

impl HutchConfig {
    /// Derives every path from a single data directory.
    #[must_use]
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            image_dir: data_dir.join("image"),
            overlay_root: data_dir.join("overlay2"),
            containers_dir: data_dir.join("containers"),
            ipam_file: data_dir.join("network").join("ipam").join("subnet.json"),
            network_dir: data_dir.join("network").join("network"),
            cgroup_root: constants::DEFAULT_CGROUP_ROOT.to_string(),
            mountinfo: PathBuf::from(constants::DEFAULT_MOUNTINFO),
            init_binary: PathBuf::from(constants::DEFAULT_INIT_BINARY),
            data_dir,
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Paths missing from the file are derived from its `data_dir`, or from
    /// the default data directory when that is missing too.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HutchError::io(path, e))?;
        let file: ConfigFile = serde_json::from_str(&content)?;
        Ok(file.resolve())
    }

    /// Directory holding everything Hutch knows about one container.
    #[must_use]
    pub fn container_dir(&self, container_id: &str) -> PathBuf {
        self.containers_dir.join(container_id)
    }

    /// Path of a container's JSON record.
    #[must_use]
    pub fn record_path(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id).join(constants::RECORD_FILE)
    }

    /// Path of a detached container's log file.
    #[must_use]
    pub fn log_path(&self, container_id: &str) -> PathBuf {
        self.container_dir(container_id)
            .join(constants::log_file_name(container_id))
    }

    /// Path of an image archive.
    #[must_use]
    pub fn image_path(&self, image: &str) -> PathBuf {
        self.image_dir.join(format!("{image}.tar"))
    }

    /// Cgroup path (relative to each controller mount) for a container.
    #[must_use]
    pub fn cgroup_path(&self, container_id: &str) -> PathBuf {
        Path::new(&self.cgroup_root).join(container_id)
    }
}

impl Default for HutchConfig {
    fn default() -> Self {
        Self::from_data_dir(constants::DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_data_dir() {
        let cfg = HutchConfig::from_data_dir("/srv/hutch");
        assert_eq!(cfg.image_path("busybox"), Path::new("/srv/hutch/image/busybox.tar"));
        assert_eq!(
            cfg.ipam_file,
            Path::new("/srv/hutch/network/ipam/subnet.json")
        );
        assert_eq!(
            cfg.log_path("abc"),
            Path::new("/srv/hutch/containers/abc/abc-json.log")
        );
        assert_eq!(cfg.cgroup_path("abc"), Path::new("hutch/abc"));
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("hutch.json");
        std::fs::write(&file, r#"{"cgroup_root": "custom"}"#).expect("write");

        let cfg = HutchConfig::load(&file).expect("load");
        assert_eq!(cfg.cgroup_root, "custom");
        assert_eq!(cfg.data_dir, Path::new(constants::DEFAULT_DATA_DIR));
    }

    #[test]
    fn load_derives_unset_paths_from_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("hutch.json");
        std::fs::write(
            &file,
            r#"{"data_dir": "/srv/hutch", "ipam_file": "/run/hutch/ipam.json"}"#,
        )
        .expect("write");

        let cfg = HutchConfig::load(&file).expect("load");
        assert_eq!(cfg.data_dir, Path::new("/srv/hutch"));
        assert_eq!(cfg.image_dir, Path::new("/srv/hutch/image"));
        assert_eq!(cfg.overlay_root, Path::new("/srv/hutch/overlay2"));
        assert_eq!(cfg.containers_dir, Path::new("/srv/hutch/containers"));
        assert_eq!(cfg.network_dir, Path::new("/srv/hutch/network/network"));
        assert_eq!(cfg.ipam_file, Path::new("/run/hutch/ipam.json"));
        assert_eq!(cfg.cgroup_root, constants::DEFAULT_CGROUP_ROOT);
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("hutch.json");
        std::fs::write(&file, r#"{"datadir": "/srv/hutch"}"#).expect("write");
        assert!(HutchConfig::load(&file).is_err());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(HutchConfig::load(&dir.path().join("absent.json")).is_err());
    }
}
