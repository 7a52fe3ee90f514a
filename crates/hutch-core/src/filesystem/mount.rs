//! Mount primitives for container filesystem setup.
//!
//! All mount-table mutations go through the [`Mounter`] trait. [`SysMounter`]
//! issues the real syscalls; the helpers in this module only decide *what* to
//! mount, which keeps them testable without privileges.

use std::path::Path;

use nix::mount::{MntFlags, MsFlags};

use hutch_common::error::{HutchError, Result};

/// Mount-table operations needed to build and tear down a container root.
pub trait Mounter {
    /// Mounts `source` on `target`, as `mount(2)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount fails.
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    /// Unmounts `target`, as `umount2(2)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the unmount fails.
    fn umount(&self, target: &Path, flags: MntFlags) -> Result<()>;

    /// Makes `new_root` the root of the mount namespace, moving the old root
    /// to `put_old`, then changes directory to the new `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pivot_root(2)` or `chdir(2)` fails.
    fn change_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;
}

/// [`Mounter`] backed by the real syscalls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysMounter;

impl Mounter for SysMounter {
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(source, target, fstype, flags, data).map_err(|e| HutchError::Syscall {
            message: format!("mount on {} failed: {e}", target.display()),
        })
    }

    fn umount(&self, target: &Path, flags: MntFlags) -> Result<()> {
        nix::mount::umount2(target, flags).map_err(|e| HutchError::Syscall {
            message: format!("umount {} failed: {e}", target.display()),
        })
    }

    fn change_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        nix::unistd::pivot_root(new_root, put_old).map_err(|e| HutchError::Syscall {
            message: format!("pivot_root to {} failed: {e}", new_root.display()),
        })?;
        nix::unistd::chdir("/").map_err(|e| HutchError::Syscall {
            message: format!("chdir to new root failed: {e}"),
        })
    }
}

/// Marks the whole mount tree private so nothing propagates back to the host.
///
/// # Errors
///
/// Returns an error if the remount fails.
pub fn make_private(mounter: &dyn Mounter) -> Result<()> {
    mounter.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None,
    )?;
    tracing::debug!("mount tree made private");
    Ok(())
}

/// Bind-mounts `source` onto `target`.
///
/// # Errors
///
/// Returns an error if the bind mount fails.
pub fn bind_mount(mounter: &dyn Mounter, source: &Path, target: &Path) -> Result<()> {
    mounter.mount(
        Some(source),
        target,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None,
    )?;
    tracing::debug!(source = %source.display(), target = %target.display(), "bind mount created");
    Ok(())
}

/// Mounts a fresh `proc` at `<root>/proc`, creating the mount point if needed.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or the mount fails.
pub fn mount_proc(mounter: &dyn Mounter, root: &Path) -> Result<()> {
    let target = ensure_dir(&root.join("proc"))?;
    mounter.mount(
        Some(Path::new("proc")),
        &target,
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None,
    )
}

/// Mounts a `tmpfs` at `<root>/dev`, creating the mount point if needed.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or the mount fails.
pub fn mount_dev(mounter: &dyn Mounter, root: &Path) -> Result<()> {
    let target = ensure_dir(&root.join("dev"))?;
    mounter.mount(
        Some(Path::new("tmpfs")),
        &target,
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
}

fn ensure_dir(path: &Path) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(path).map_err(|e| HutchError::io(path, e))?;
    Ok(path.to_path_buf())
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingMounter};
    use super::*;

    #[test]
    fn make_private_is_recursive_on_root() {
        let m = RecordingMounter::default();
        make_private(&m).unwrap();
        assert_eq!(
            m.calls(),
            vec![Call::Mount {
                source: None,
                target: "/".into(),
                fstype: None,
                flags: MsFlags::MS_PRIVATE | MsFlags::MS_REC,
                data: None,
            }]
        );
    }

    #[test]
    fn proc_and_dev_are_mounted_with_restrictive_flags() {
        let root = tempfile::tempdir().unwrap();
        let m = RecordingMounter::default();
        mount_proc(&m, root.path()).unwrap();
        mount_dev(&m, root.path()).unwrap();

        assert!(root.path().join("proc").is_dir());
        assert!(root.path().join("dev").is_dir());
        let calls = m.calls();
        assert!(matches!(
            &calls[0],
            Call::Mount { fstype: Some(t), flags, .. }
                if t == "proc" && *flags == MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV
        ));
        assert!(matches!(
            &calls[1],
            Call::Mount { fstype: Some(t), data: Some(d), .. } if t == "tmpfs" && d == "mode=755"
        ));
    }

    #[test]
    fn bind_mount_records_source_and_target() {
        let m = RecordingMounter::default();
        bind_mount(&m, Path::new("/host/data"), Path::new("/merged/data")).unwrap();
        assert!(matches!(
            &m.calls()[0],
            Call::Mount { source: Some(s), target, .. }
                if s == Path::new("/host/data") && target == Path::new("/merged/data")
        ));
    }
}
