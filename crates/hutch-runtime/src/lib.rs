//! Container lifecycle management for the Hutch runtime.
//!
//! [`engine::Engine`] is the entry point: it builds the root filesystem,
//! spawns the init through a [`backend::ContainerBackend`], applies cgroup
//! limits, wires networking and persists container records. [`init`] is the
//! other half, running inside the new namespaces.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod container;
pub mod engine;
pub mod exec;
pub mod init;
pub mod logs;
pub mod network;
pub mod process;
pub mod rootfs;
pub mod state;
