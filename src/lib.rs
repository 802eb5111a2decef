//! volfs is a Unix-like filesystem living inside a single image file.
//!
//! The volume is split into five regions, in order: superblock, cluster
//! bitmap, inode bitmap, inode table and data clusters. Files address
//! their data through five direct pointers, one singly-indirect table
//! and one doubly-indirect table of tables. Everything on disk is packed
//! little-endian.
//!
//! Layers, bottom to top:
//! 1. [`volume`]: raw byte and record I/O over the memory-mapped image.
//! 2. [`fs::bitmap`] and [`fs::alloc`]: occupancy tracking, free-slot
//!    search and the grow/shrink of an inode's cluster chain.
//! 3. [`fs::inode`]: cluster resolution and data I/O with on-demand
//!    growth.
//! 4. [`fs::directory`]: fixed-width directory entries inside directory
//!    inodes.
//! 5. [`fs::fs_api_impl`]: path resolution and the file API the shell
//!    dispatches to.
//! 6. [`fs::fsck`]: reconciliation of live reachability against both
//!    bitmaps.

pub mod cli_interface;
pub mod error;
pub mod fs;
pub mod mkfs;
pub mod mount;
pub mod utils;
pub mod volume;

pub use error::{FsError, MissingEntry, Result};
pub use fs::*;
