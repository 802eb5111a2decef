//! The layout descriptor written at offset 0 of every volume.

use bincode::{Decode, Encode};

use crate::error::{FsError, Result};
use crate::fs::{
    fixed_bytes, ClusterPtr, InodePtr, VolumePtr, CLUSTER_PTR_SIZE, DESCRIPTOR_LENGTH,
    DIRECT_POINTERS, INODE_SIZE, SIGNATURE, SIGNATURE_LENGTH, SUPERBLOCK_SIZE,
};
use crate::utils::fs_size_calculator;

/// Immutable after format. All region start fields are absolute byte
/// offsets into the volume; regions follow each other in declaration
/// order, with the data region closing the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SuperBlock {
    pub signature: [u8; SIGNATURE_LENGTH],
    pub volume_descriptor: [u8; DESCRIPTOR_LENGTH],
    pub disk_size: VolumePtr,
    pub cluster_size: i16,
    pub cluster_count: ClusterPtr,
    pub cluster_bitmap_start: VolumePtr,
    pub inode_bitmap_start: VolumePtr,
    pub inodes_start: VolumePtr,
    pub data_start: VolumePtr,
}

impl SuperBlock {
    /// Compute the geometry for a fresh volume: 5% metadata, 95% data.
    ///
    /// The inode count is the largest that fits into the metadata left
    /// over after the superblock and the cluster bitmap, together with
    /// its own bitmap.
    pub fn compute(descriptor: &str, disk_size: VolumePtr, cluster_size: i16) -> SuperBlock {
        let metadata_size = fs_size_calculator::metadata_size(disk_size);
        let cluster_count = fs_size_calculator::cluster_count(disk_size, cluster_size);
        let cluster_bitmap_size = fs_size_calculator::bitmap_size(cluster_count);

        let inode_region = metadata_size - SUPERBLOCK_SIZE as VolumePtr - cluster_bitmap_size;
        let total_inodes = fs_size_calculator::max_inodes(inode_region);
        let inode_bitmap_size = fs_size_calculator::bitmap_size(total_inodes);

        let cluster_bitmap_start = SUPERBLOCK_SIZE as VolumePtr;
        let inode_bitmap_start = cluster_bitmap_start + cluster_bitmap_size;
        let inodes_start = inode_bitmap_start + inode_bitmap_size;

        SuperBlock {
            signature: fixed_bytes(SIGNATURE),
            volume_descriptor: fixed_bytes(descriptor.as_bytes()),
            disk_size,
            cluster_size,
            cluster_count: cluster_count as ClusterPtr,
            cluster_bitmap_start,
            inode_bitmap_start,
            inodes_start,
            data_start: metadata_size,
        }
    }

    pub fn validate_signature(&self) -> Result<()> {
        if self.signature != fixed_bytes::<SIGNATURE_LENGTH>(SIGNATURE) {
            return Err(FsError::InvalidSignature);
        }
        Ok(())
    }

    pub fn cluster_bitmap_bytes(&self) -> usize {
        (self.inode_bitmap_start - self.cluster_bitmap_start) as usize
    }

    pub fn inode_bitmap_bytes(&self) -> usize {
        (self.inodes_start - self.inode_bitmap_start) as usize
    }

    /// Number of usable inode slots: bounded both by the table region and
    /// by the bitmap that tracks it.
    pub fn total_inodes(&self) -> i64 {
        let by_table = (self.data_start - self.inodes_start) / INODE_SIZE as i64;
        let by_bitmap = self.inode_bitmap_bytes() as i64 * 8;
        by_table.min(by_bitmap)
    }

    pub fn cluster_ptr_to_volume_ptr(&self, ptr: ClusterPtr) -> VolumePtr {
        self.data_start + ptr as VolumePtr * self.cluster_size as VolumePtr
    }

    pub fn inode_ptr_to_volume_ptr(&self, ptr: InodePtr) -> VolumePtr {
        self.inodes_start + ptr as VolumePtr * INODE_SIZE as VolumePtr
    }

    /// `P`: cluster pointers per pointer-table cluster.
    pub fn ptrs_per_cluster(&self) -> i64 {
        self.cluster_size as i64 / CLUSTER_PTR_SIZE as i64
    }

    /// Ceiling of the pointer tree: `5 + P + P^2` data clusters.
    pub fn max_file_clusters(&self) -> i64 {
        let ptrs = self.ptrs_per_cluster();
        DIRECT_POINTERS as i64 + ptrs + ptrs * ptrs
    }

    pub fn descriptor_str(&self) -> String {
        let end = self
            .volume_descriptor
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DESCRIPTOR_LENGTH);
        String::from_utf8_lossy(&self.volume_descriptor[..end]).into_owned()
    }
}
