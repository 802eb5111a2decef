//! The on-disk filesystem engine.
//!
//! Volume layout, in order: superblock, cluster bitmap, inode bitmap,
//! inode table, data clusters. The format reserves 5% of the volume for
//! metadata and 95% for data.

pub mod alloc;
pub mod bitmap;
pub mod directory;
pub mod filekind;
pub mod fs_api_impl;
pub mod fs_layout;
pub mod fsck;
pub mod inode;
pub mod superblock;
pub mod transfer;

pub use bitmap::Bitmap;
pub use directory::DirectoryEntry;
pub use filekind::InodeKind;
pub use fs_api_impl::{File, FileInfo};
pub use fs_layout::{Filesystem, VolumeStats};
pub use fsck::{CheckReport, CheckViolation};
pub use inode::{ClusterUsage, DoubleIndirectTable, IndirectTable, Inode, InodeHandle};
pub use superblock::SuperBlock;

pub use crate::volume::Volume;

/// Absolute byte offset into the volume.
pub type VolumePtr = i64;
/// Index into the data-cluster region.
pub type ClusterPtr = i32;
/// Index into the inode table.
pub type InodePtr = i32;

pub const SIGNATURE: &[u8] = b"volfs";
pub const SIGNATURE_LENGTH: usize = 9;
pub const DESCRIPTOR_LENGTH: usize = 251;
/// Encoded superblock length: the two fixed strings plus the scalar
/// fields starting at byte 260.
pub const SUPERBLOCK_SIZE: usize = 306;
/// Encoded inode length: kind, size, cluster count, five direct pointers,
/// indirect1, indirect2.
pub const INODE_SIZE: usize = 41;
pub const DIRECT_POINTERS: usize = 5;
pub const CLUSTER_PTR_SIZE: usize = std::mem::size_of::<ClusterPtr>();
pub const NAME_LENGTH: usize = 12;
pub const DIRECTORY_ENTRY_SIZE: usize = 16;
pub const ROOT_INODE: InodePtr = 0;
pub const MIN_VOLUME_SIZE: VolumePtr = 1_000_000;
pub const DEFAULT_CLUSTER_SIZE: i16 = 4096;
/// On-disk sentinel for an unassigned cluster pointer. In memory the
/// pointer fields are `Option<ClusterPtr>`; the sentinel only exists in
/// the encoded form.
pub const UNUSED: ClusterPtr = -1;
/// The free-cluster search walks the cluster bitmap in chunks of this
/// many bytes.
pub const BITMAP_SCAN_CHUNK: usize = 512;

/// Zero-padded fixed-width form of a byte string; longer input is
/// truncated.
pub(crate) fn fixed_bytes<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = src.len().min(N);
    out[..len].copy_from_slice(&src[..len]);
    out
}
