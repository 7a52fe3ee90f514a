//! Container log access.
//!
//! Detached containers write stdout and stderr straight into
//! `<containers_dir>/<id>/<id>-json.log`; foreground containers have no log.

use std::path::PathBuf;

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};

/// Creates the container directory and returns the log file path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn prepare_log(config: &HutchConfig, container_id: &str) -> Result<PathBuf> {
    let dir = config.container_dir(container_id);
    std::fs::create_dir_all(&dir).map_err(|e| HutchError::io(&dir, e))?;
    Ok(config.log_path(container_id))
}

/// Reads container logs from disk.
///
/// Returns an empty string if the log file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(config: &HutchConfig, container_id: &str) -> Result<String> {
    let path = config.log_path(container_id);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(HutchError::io(path, e)),
    }
}
