//! Runtime engine that orchestrates container lifecycle.
//!
//! The engine owns the configuration and the three privileged seams (process
//! backend, mounter, link operations) and sequences them for every CLI
//! command. All state lives on disk; an engine holds nothing between calls.

use ipnetwork::Ipv4Network;
use nix::sys::signal::Signal;

use hutch_common::config::HutchConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, PortMapping, ResourceLimits, VolumeSpec};
use hutch_core::cgroup::CgroupManager;
use hutch_core::filesystem::mount::{Mounter, SysMounter};
use hutch_core::network::Network;
use hutch_core::network::link::{IpRoute2, LinkOps};
use hutch_image::storage::ImageStore;

use crate::backend::ContainerBackend;
use crate::backend::linux::LinuxBackend;
use crate::container::ContainerRecord;
use crate::network::NetworkManager;
use crate::process::{self, ParentProcess, ProcessOptions};
use crate::rootfs::Workspace;
use crate::{exec, logs, state};

/// Parameters of `hutch run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Attach to the terminal and wait for the container to exit.
    pub tty: bool,
    /// Run in the background.
    pub detach: bool,
    /// Image name, resolved to `<image_dir>/<image>.tar`.
    pub image: String,
    /// Command and arguments run inside the container.
    pub command: Vec<String>,
    /// Cgroup limits.
    pub limits: ResourceLimits,
    /// `hostPath:containerPath` bind mount.
    pub volume: Option<String>,
    /// Container name.
    pub name: Option<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Network to attach to.
    pub network: Option<String>,
    /// Ports forwarded from the host.
    pub ports: Vec<PortMapping>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Identifier of the new container.
    pub id: ContainerId,
    /// Host pid of its init.
    pub pid: u32,
    /// Exit code, for foreground runs.
    pub exit_code: Option<i32>,
}

/// The runtime engine that coordinates all container operations.
pub struct Engine {
    config: HutchConfig,
    backend: Box<dyn ContainerBackend>,
    mounter: Box<dyn Mounter>,
    links: Box<dyn LinkOps>,
}

impl Engine {
    /// Creates an engine using the real Linux primitives.
    #[must_use]
    pub fn new(config: HutchConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(LinuxBackend::new()),
            Box::new(SysMounter),
            Box::new(IpRoute2),
        )
    }

    /// Creates an engine from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: HutchConfig,
        backend: Box<dyn ContainerBackend>,
        mounter: Box<dyn Mounter>,
        links: Box<dyn LinkOps>,
    ) -> Self {
        Self {
            config,
            backend,
            mounter,
            links,
        }
    }

    /// The configuration this engine operates on.
    #[must_use]
    pub const fn config(&self) -> &HutchConfig {
        &self.config
    }

    fn images(&self) -> ImageStore {
        ImageStore::new(&self.config.image_dir)
    }

    fn networks(&self) -> NetworkManager<'_> {
        NetworkManager::new(&self.config, self.links.as_ref())
    }

    /// Creates and starts a container.
    ///
    /// The command is only released to the init once limits, networking and
    /// the record are in place. A foreground run waits for the container and
    /// removes everything it built; a detached run returns right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or any setup step fails.
    /// A failure after the init started closes the pipe without a command,
    /// reaps the init and tears the container down.
    pub fn run(&self, options: &RunOptions) -> Result<RunOutcome> {
        if options.command.is_empty() {
            return Err(HutchError::config("no command given"));
        }
        let volume = options
            .volume
            .as_deref()
            .map(str::parse::<VolumeSpec>)
            .transpose()?;

        let id = ContainerId::generate();
        let process_options = ProcessOptions {
            tty: options.tty,
            detach: options.detach,
            image: options.image.clone(),
            volume,
            env: options.env.clone(),
        };
        let (mut parent, pipe) = ParentProcess::create(
            &self.config,
            &id,
            &process_options,
            self.mounter.as_ref(),
            &self.images(),
        )?;

        let pid = match parent.start(self.backend.as_ref()) {
            Ok(pid) => pid,
            Err(e) => {
                parent.workspace().delete(self.mounter.as_ref());
                if let Err(err) = state::remove_record(&self.config, &id) {
                    tracing::warn!(id = %id, error = %err, "failed to remove container directory");
                }
                return Err(e);
            }
        };
        tracing::info!(id = %id, pid, image = %options.image, "container started");

        let mut record = ContainerRecord::running(
            id.clone(),
            pid,
            options.name.clone(),
            &options.command,
            &options.image,
        );
        record.volume.clone_from(&options.volume);

        let configured = self
            .configure(&mut record, pid, options)
            .and_then(|()| process::send_init_command(pipe, &options.command));
        if let Err(e) = configured {
            self.reap(pid);
            self.teardown(&record, parent.workspace());
            return Err(e);
        }

        if options.detach {
            return Ok(RunOutcome {
                id,
                pid,
                exit_code: None,
            });
        }

        let waited = self.backend.wait(pid);
        self.teardown(&record, parent.workspace());
        let code = waited?;
        tracing::info!(id = %id, code, "container exited");
        Ok(RunOutcome {
            id,
            pid,
            exit_code: Some(code),
        })
    }

    fn configure(&self, record: &mut ContainerRecord, pid: u32, options: &RunOptions) -> Result<()> {
        let cgroup = CgroupManager::for_container(&self.config, &record.id);
        cgroup.set(&options.limits);
        cgroup.apply(pid, &options.limits);

        if let Some(network) = &options.network {
            let endpoint = self
                .networks()
                .connect(network, &record.id, pid, &options.ports)?;
            record.network = Some(network.clone());
            record.ip = Some(endpoint.ip);
            record.port_mappings.clone_from(&options.ports);
        }
        state::save_record(&self.config, record)
    }

    fn reap(&self, pid: u32) {
        match self.backend.wait(pid) {
            Ok(code) => tracing::debug!(pid, code, "aborted init reaped"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to reap aborted init"),
        }
    }

    fn teardown(&self, record: &ContainerRecord, workspace: &Workspace) {
        workspace.delete(self.mounter.as_ref());
        CgroupManager::for_container(&self.config, &record.id).destroy();
        if let Some(network) = &record.network {
            self.networks()
                .disconnect(network, &record.id, record.ip, &record.port_mappings);
        }
        if let Err(e) = state::remove_record(&self.config, &record.id) {
            tracing::warn!(id = %record.id, error = %e, "failed to remove container record");
        }
    }

    fn workspace_of(&self, record: &ContainerRecord) -> Workspace {
        let volume = record.volume.as_deref().and_then(|v| v.parse().ok());
        Workspace::new(&self.config, &record.id, volume)
    }

    /// Sends SIGTERM to a running container and marks it stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or not running, or its
    /// record cannot be rewritten. A failed signal is only logged.
    pub fn stop(&self, id: &ContainerId) -> Result<()> {
        let mut record = state::load_record(&self.config, id)?;
        if !record.is_running() {
            return Err(HutchError::config(format!("container {id} is not running")));
        }
        if let Some(pid) = record.pid {
            if let Err(e) = self.backend.signal(pid, Signal::SIGTERM) {
                tracing::warn!(id = %id, pid, error = %e, "failed to signal container");
            }
        }
        record.mark_stopped();
        state::save_record(&self.config, &record)?;
        tracing::info!(id = %id, "container stopped");
        Ok(())
    }

    /// Removes a container's record, filesystem, cgroup and network endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ContainerRunning` for a running container unless `force` is
    /// set, in which case it is stopped first.
    pub fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        let record = state::load_record(&self.config, id)?;
        if record.is_running() {
            if !force {
                return Err(HutchError::ContainerRunning { id: id.to_string() });
            }
            self.stop(id)?;
        }
        self.teardown(&record, &self.workspace_of(&record));
        tracing::info!(id = %id, "container removed");
        Ok(())
    }

    /// Every container record, oldest first.
    ///
    /// Running records whose init has gone away are marked exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers directory cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let mut records = state::list_records(&self.config)?;
        for record in &mut records {
            if !record.is_running() || record.pid.is_some_and(|pid| self.backend.is_alive(pid)) {
                continue;
            }
            record.mark_exited();
            if let Err(e) = state::save_record(&self.config, record) {
                tracing::warn!(id = %record.id, error = %e, "failed to refresh container status");
            }
        }
        Ok(records)
    }

    /// The log output of a detached container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown container, or an error if the log
    /// cannot be read.
    pub fn logs(&self, id: &ContainerId) -> Result<String> {
        let _ = state::load_record(&self.config, id)?;
        logs::read_logs(&self.config, id.as_str())
    }

    /// Runs `command` inside a running container and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or not running, or the
    /// command cannot be started.
    pub fn exec(&self, id: &ContainerId, command: &[String]) -> Result<i32> {
        let record = state::load_record(&self.config, id)?;
        let pid = record
            .pid
            .filter(|_| record.is_running())
            .ok_or_else(|| HutchError::config(format!("container {id} is not running")))?;
        let env = exec::read_environ(pid)?;
        exec::exec_in_container(pid, command, &env)
    }

    /// Archives a container's root filesystem as image `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or the archive cannot be
    /// written.
    pub fn commit(&self, id: &ContainerId, image: &str) -> Result<()> {
        let record = state::load_record(&self.config, id)?;
        let workspace = self.workspace_of(&record);
        let path = self.images().commit(workspace.merged(), image)?;
        tracing::info!(id = %id, image, path = %path.display(), "container committed");
        Ok(())
    }

    /// Creates a network.
    ///
    /// # Errors
    ///
    /// See [`NetworkManager::create`].
    pub fn create_network(&self, driver: &str, subnet: Ipv4Network, name: &str) -> Result<Network> {
        self.networks().create(driver, subnet, name)
    }

    /// Every known network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network directory cannot be read.
    pub fn list_networks(&self) -> Result<Vec<Network>> {
        self.networks().list()
    }

    /// Removes a network.
    ///
    /// # Errors
    ///
    /// See [`NetworkManager::remove`].
    pub fn remove_network(&self, name: &str) -> Result<()> {
        self.networks().remove(name)
    }
}
