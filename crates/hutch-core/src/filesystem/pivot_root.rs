//! Root filesystem switching via `pivot_root(2)`.
//!
//! Unlike `chroot`, this replaces the root mount of the namespace, so the old
//! root can be detached entirely.

use std::path::Path;

use nix::mount::MntFlags;

use hutch_common::error::{HutchError, Result};

use super::mount::{self, Mounter};

/// Hidden directory that temporarily holds the old root.
const PUT_OLD: &str = ".pivot_root";

/// Makes `new_root` the root of the current mount namespace.
///
/// `new_root` is bind-mounted onto itself first (`pivot_root` requires a mount
/// point), the old root is parked in `new_root/.pivot_root`, detached, and the
/// directory removed. The mount tree must already be private.
///
/// # Errors
///
/// Returns an error if the bind, the pivot, or the detach fails. Failing to
/// remove the emptied directory is only logged.
pub fn pivot_root(mounter: &dyn Mounter, new_root: &Path) -> Result<()> {
    tracing::info!(new_root = %new_root.display(), "performing pivot_root");

    mount::bind_mount(mounter, new_root, new_root)?;

    let put_old = new_root.join(PUT_OLD);
    match std::fs::create_dir(&put_old) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(HutchError::io(put_old, e)),
    }

    mounter.change_root(new_root, &put_old)?;

    let old_root = Path::new("/").join(PUT_OLD);
    mounter.umount(&old_root, MntFlags::MNT_DETACH)?;
    if let Err(e) = std::fs::remove_dir(&old_root) {
        tracing::warn!(path = %old_root.display(), error = %e, "failed to remove old root directory");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nix::mount::MsFlags;

    use super::super::mount::testing::{Call, RecordingMounter};
    use super::*;

    #[test]
    fn binds_then_pivots_then_detaches() {
        let root = tempfile::tempdir().unwrap();
        let m = RecordingMounter::default();
        pivot_root(&m, root.path()).unwrap();

        let calls = m.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            Call::Mount {
                source: Some(root.path().to_path_buf()),
                target: root.path().to_path_buf(),
                fstype: None,
                flags: MsFlags::MS_BIND | MsFlags::MS_REC,
                data: None,
            }
        );
        assert_eq!(
            calls[1],
            Call::ChangeRoot {
                new_root: root.path().to_path_buf(),
                put_old: root.path().join(".pivot_root"),
            }
        );
        assert_eq!(
            calls[2],
            Call::Umount {
                target: PathBuf::from("/.pivot_root"),
                flags: MntFlags::MNT_DETACH,
            }
        );
        assert!(root.path().join(".pivot_root").is_dir());
    }

    #[test]
    fn detach_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let m = RecordingMounter {
            fail_umount: true,
            ..RecordingMounter::default()
        };
        assert!(pivot_root(&m, root.path()).is_err());
    }
}
