//! Persistent state management.
//!
//! Each container owns `<containers_dir>/<id>/`, holding its JSON record and,
//! when detached, its log file. There is no shared index, so concurrent
//! invocations only race on the same container.

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::ContainerId;

use crate::container::ContainerRecord;

/// Writes a container record, creating its directory if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_record(config: &HutchConfig, record: &ContainerRecord) -> Result<()> {
    let dir = config.container_dir(record.id.as_str());
    std::fs::create_dir_all(&dir).map_err(|e| HutchError::io(&dir, e))?;
    let path = config.record_path(record.id.as_str());
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json).map_err(|e| HutchError::io(&path, e))?;
    tracing::debug!(id = %record.id, path = %path.display(), "container record saved");
    Ok(())
}

/// Reads the record of one container.
///
/// # Errors
///
/// Returns `NotFound` if the container has no record, or an error if the
/// record cannot be read or parsed.
pub fn load_record(config: &HutchConfig, id: &ContainerId) -> Result<ContainerRecord> {
    let path = config.record_path(id.as_str());
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HutchError::NotFound {
                kind: "container",
                id: id.to_string(),
            });
        }
        Err(e) => return Err(HutchError::io(path, e)),
    };
    Ok(serde_json::from_str(&content)?)
}

/// Removes a container's directory: record and log file.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_record(config: &HutchConfig, id: &ContainerId) -> Result<()> {
    let dir = config.container_dir(id.as_str());
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HutchError::io(dir, e)),
    }
}

/// Reads every container record, ordered by creation time then id.
///
/// Directories without a readable record are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the containers directory exists but cannot be listed.
pub fn list_records(config: &HutchConfig) -> Result<Vec<ContainerRecord>> {
    let dir = &config.containers_dir;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(HutchError::io(dir, e)),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HutchError::io(dir, e))?;
        let id = ContainerId::new(entry.file_name().to_string_lossy());
        match load_record(config, &id) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable container record"),
        }
    }
    records.sort_by(|a, b| (&a.created, a.id.as_str()).cmp(&(&b.created, b.id.as_str())));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ContainerRecord {
        ContainerRecord::running(ContainerId::new(id), 7, None, &["top".to_string()], "busybox")
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let r = record("abc");
        save_record(&config, &r).unwrap();

        assert!(config.record_path("abc").is_file());
        assert_eq!(load_record(&config, &r.id).unwrap(), r);
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let err = load_record(&config, &ContainerId::new("nope")).unwrap_err();
        assert!(matches!(err, HutchError::NotFound { kind: "container", .. }));
    }

    #[test]
    fn remove_deletes_log_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        save_record(&config, &record("abc")).unwrap();
        std::fs::write(config.log_path("abc"), "hello\n").unwrap();

        remove_record(&config, &ContainerId::new("abc")).unwrap();
        assert!(!config.container_dir("abc").exists());
        remove_record(&config, &ContainerId::new("abc")).unwrap();
    }

    #[test]
    fn list_skips_broken_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        assert!(list_records(&config).unwrap().is_empty());

        save_record(&config, &record("b")).unwrap();
        save_record(&config, &record("a")).unwrap();
        std::fs::create_dir_all(config.container_dir("broken")).unwrap();

        let ids: Vec<_> = list_records(&config)
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()) && ids.contains(&"b".to_string()));
    }
}
