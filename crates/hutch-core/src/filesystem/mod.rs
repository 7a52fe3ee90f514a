//! Filesystem management for container isolation.
//!
//! Provides `OverlayFS` layer mounting, `pivot_root` for switching the root
//! of a mount namespace, and the [`mount::Mounter`] seam both are built on.

pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
