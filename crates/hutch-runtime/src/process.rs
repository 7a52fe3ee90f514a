//! Parent side of container process creation.
//!
//! [`ParentProcess::create`] builds the root filesystem and a one-shot
//! command pipe; [`ParentProcess::start`] spawns the init inside fresh
//! namespaces. The command itself is written into the pipe only after the
//! caller has finished configuring cgroups and networking, so the init never
//! runs the user command in a half-configured container.

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};

use nix::fcntl::OFlag;

use hutch_common::config::HutchConfig;
use hutch_common::constants::INIT_ARG;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, VolumeSpec};
use hutch_core::filesystem::mount::Mounter;
use hutch_core::namespace::NamespaceConfig;
use hutch_image::storage::ImageStore;

use crate::backend::{ContainerBackend, SpawnRequest, StdioMode};
use crate::logs;
use crate::rootfs::Workspace;

/// How the container's init should be attached to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Attach to the caller's terminal.
    pub tty: bool,
    /// Run in the background with output sent to the log file.
    pub detach: bool,
    /// Image to build the root filesystem from.
    pub image: String,
    /// Optional bind mount.
    pub volume: Option<VolumeSpec>,
    /// Extra environment variables for the init.
    pub env: Vec<(String, String)>,
}

/// A prepared, not yet started, container init.
#[derive(Debug)]
pub struct ParentProcess {
    request: SpawnRequest,
    workspace: Workspace,
    pipe: Option<OwnedFd>,
}

impl ParentProcess {
    /// Builds the workspace and the command pipe for container `id`.
    ///
    /// Returns the handle and the write end of the pipe.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless exactly one of `tty` and
    /// `detach` is set, or an error if the pipe, log directory, or workspace
    /// cannot be created. A partially built workspace is removed.
    pub fn create(
        config: &HutchConfig,
        id: &ContainerId,
        options: &ProcessOptions,
        mounter: &dyn Mounter,
        images: &ImageStore,
    ) -> Result<(Self, File)> {
        if options.tty == options.detach {
            return Err(HutchError::config(
                "exactly one of interactive (-i) and detached (-d) mode must be chosen",
            ));
        }

        let (read, write) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| HutchError::Syscall {
                message: format!("pipe2 failed: {e}"),
            })?;

        let workspace = Workspace::new(config, id, options.volume.clone());
        let stdio = workspace
            .create(mounter, images, &options.image)
            .and_then(|()| stdio_for(config, id, options.detach));
        let stdio = match stdio {
            Ok(stdio) => stdio,
            Err(e) => {
                workspace.delete(mounter);
                return Err(e);
            }
        };

        let request = SpawnRequest {
            program: config.init_binary.clone(),
            args: vec![INIT_ARG.to_string()],
            namespaces: NamespaceConfig::default(),
            cwd: workspace.merged().to_path_buf(),
            env: options.env.clone(),
            stdio,
        };
        Ok((
            Self {
                request,
                workspace,
                pipe: Some(read),
            },
            File::from(write),
        ))
    }

    /// The container's root filesystem.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Spawns the init and closes the parent's copy of the pipe read end.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was already started or the backend
    /// fails to spawn it.
    pub fn start(&mut self, backend: &dyn ContainerBackend) -> Result<u32> {
        let pipe = self
            .pipe
            .take()
            .ok_or_else(|| HutchError::config("container process already started"))?;
        let pid = backend.spawn(&self.request, pipe.as_fd())?;
        drop(pipe);
        Ok(pid)
    }
}

fn stdio_for(config: &HutchConfig, id: &ContainerId, detach: bool) -> Result<StdioMode> {
    if detach {
        Ok(StdioMode::LogFile(logs::prepare_log(config, id.as_str())?))
    } else {
        Ok(StdioMode::Inherit)
    }
}

/// Writes the command into the init pipe and closes it.
///
/// # Errors
///
/// Returns an error if the command cannot be encoded or written.
pub fn send_init_command(mut pipe: File, command: &[String]) -> Result<()> {
    let payload = serde_json::to_vec(command)?;
    pipe.write_all(&payload)
        .map_err(|e| HutchError::io("init pipe", e))?;
    tracing::debug!(cmd = ?command, "init command sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn sent_command_is_a_json_array() {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).unwrap();
        let command = ["sh".to_string(), "-c".to_string(), "echo hi".to_string()];
        send_init_command(File::from(write), &command).unwrap();

        let mut payload = String::new();
        let _ = File::from(read).read_to_string(&mut payload).unwrap();
        assert_eq!(payload, r#"["sh","-c","echo hi"]"#);
    }

    #[test]
    fn tty_and_detach_are_mutually_exclusive() {
        struct NoMount;
        impl Mounter for NoMount {
            fn mount(
                &self,
                _: Option<&std::path::Path>,
                _: &std::path::Path,
                _: Option<&str>,
                _: nix::mount::MsFlags,
                _: Option<&str>,
            ) -> Result<()> {
                unreachable!("no mount expected")
            }
            fn umount(&self, _: &std::path::Path, _: nix::mount::MntFlags) -> Result<()> {
                unreachable!("no umount expected")
            }
            fn change_root(&self, _: &std::path::Path, _: &std::path::Path) -> Result<()> {
                unreachable!("no pivot expected")
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = HutchConfig::from_data_dir(dir.path());
        let images = ImageStore::new(&config.image_dir);
        for (tty, detach) in [(true, true), (false, false)] {
            let options = ProcessOptions {
                tty,
                detach,
                image: "busybox".into(),
                volume: None,
                env: Vec::new(),
            };
            let id = ContainerId::new("x");
            let err = ParentProcess::create(&config, &id, &options, &NoMount, &images).unwrap_err();
            assert!(matches!(err, HutchError::Config { .. }));
        }
    }
}
