//! Linux namespace selection for container isolation.
//!
//! The container init is created directly inside its namespaces by
//! `clone(2)`; this module decides which `CLONE_NEW*` flags are passed.

use nix::sched::CloneFlags;

/// Which namespaces a new container init is placed in.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Own hostname and domain name.
    pub uts: bool,
    /// Own process ID space; the init becomes PID 1.
    pub pid: bool,
    /// Own mount table.
    pub mount: bool,
    /// Own network stack.
    pub network: bool,
    /// Own System V IPC objects and POSIX message queues.
    pub ipc: bool,
}

impl Default for NamespaceConfig {
    /// Every supported namespace. User namespaces are never requested.
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network: true,
            ipc: true,
        }
    }
}

impl NamespaceConfig {
    /// The `clone(2)` flags for the selected namespaces.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        for (enabled, flag) in [
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
        ] {
            if enabled {
                flags |= flag;
            }
        }
        flags
    }

    /// `nsenter(1)` options that join the same namespaces of a running process.
    #[must_use]
    pub fn nsenter_args(&self, pid: u32) -> Vec<String> {
        let mut args = vec!["--target".to_string(), pid.to_string()];
        for (enabled, opt) in [
            (self.ipc, "--ipc"),
            (self.uts, "--uts"),
            (self.network, "--net"),
            (self.pid, "--pid"),
            (self.mount, "--mount"),
        ] {
            if enabled {
                args.push(opt.to_string());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_five_namespaces_without_user() {
        let flags = NamespaceConfig::default().clone_flags();
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
        );
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn disabled_namespaces_are_left_out() {
        let cfg = NamespaceConfig {
            network: false,
            ..NamespaceConfig::default()
        };
        assert!(!cfg.clone_flags().contains(CloneFlags::CLONE_NEWNET));
        assert!(!cfg.nsenter_args(7).contains(&"--net".to_string()));
    }

    #[test]
    fn nsenter_args_target_the_pid() {
        let args = NamespaceConfig::default().nsenter_args(42);
        assert_eq!(
            args,
            ["--target", "42", "--ipc", "--uts", "--net", "--pid", "--mount"]
        );
    }
}
