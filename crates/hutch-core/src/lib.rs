//! # hutch-core
//!
//! Low-level Linux isolation primitives for the Hutch runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: the clone flags used to isolate the container init.
//! - **Cgroups v1**: memory, CPU, and cpuset resource limiting.
//! - **Filesystem**: `OverlayFS` mounts, bind mounts, and `pivot_root`.
//! - **Network**: bitmap IP allocation and bridge/veth wiring.
//!
//! Every privileged operation goes through a narrow trait
//! ([`filesystem::mount::Mounter`], [`network::link::LinkOps`]) so the
//! logic built on top can be exercised against fakes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod network;
