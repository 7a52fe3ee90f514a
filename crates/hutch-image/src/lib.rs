//! # hutch-image
//!
//! Image archive management for the Hutch runtime.
//!
//! Handles:
//! - **Layers**: unpacking plain or gzip tar archives and packing a directory
//!   back into one.
//! - **Storage**: the `<image_dir>/<name>.tar` store, cache-aware extraction
//!   into a container's lower layer, and `commit`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod layer;
pub mod storage;
