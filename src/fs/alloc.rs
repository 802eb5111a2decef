//! Free-slot search plus growing and shrinking of an inode's cluster
//! chain.
//!
//! Growth fills the three levels in order: direct slots, then the
//! indirect1 table, then the indirect2 tree. Shrinking releases them in
//! the opposite order, freeing a pointer-table cluster as soon as it
//! holds no data pointers. Both keep `allocated_clusters` equal to the
//! number of data clusters actually reachable from the inode.

use log::debug;

use crate::error::{FsError, Result};
use crate::fs::{
    Bitmap, ClusterPtr, Filesystem, Inode, InodeHandle, InodePtr, VolumePtr, BITMAP_SCAN_CHUNK,
    DIRECT_POINTERS,
};

impl Filesystem {
    /// First free inode slot. With `occupy` the bitmap bit is set and a
    /// freshly initialized record is written into the slot; otherwise the
    /// stored record is returned untouched.
    pub fn find_free_inode(&mut self, occupy: bool) -> Result<InodeHandle> {
        let bitmap = self.read_inode_bitmap()?;
        let total = self.superblock().total_inodes();
        let free = bitmap
            .first_zero()
            .filter(|&index| (index as i64) < total)
            .ok_or(FsError::NoFreeInode)?;
        let ptr = free as InodePtr;
        if !occupy {
            return self.load_inode(ptr);
        }

        self.set_inode_bit(ptr, 1)?;
        let handle = InodeHandle {
            ptr,
            inode: Inode::default(),
        };
        self.save_inode(&handle)?;
        Ok(handle)
    }

    /// Clear the inode's bitmap bit. The record itself is not scrubbed;
    /// callers free the inode's clusters first.
    pub fn free_inode(&mut self, ptr: InodePtr) -> Result<()> {
        self.set_inode_bit(ptr, 0)
    }

    pub fn inode_bit(&self, ptr: InodePtr) -> Result<bool> {
        let byte = self
            .volume()
            .read_u8(self.superblock().inode_bitmap_start + (ptr / 8) as VolumePtr)?;
        Ok(byte >> (ptr % 8) & 1 == 1)
    }

    fn set_inode_bit(&mut self, ptr: InodePtr, value: u8) -> Result<()> {
        let total = self.superblock().total_inodes();
        if ptr < 0 || (ptr as i64) >= total {
            return Err(FsError::OutOfRange {
                index: ptr as i64,
                max: total - 1,
            });
        }
        let address = self.superblock().inode_bitmap_start + (ptr / 8) as VolumePtr;
        let byte = self.volume().read_u8(address)?;
        let mask = 1u8 << (ptr % 8);
        let byte = if value == 1 { byte | mask } else { byte & !mask };
        self.volume_mut().write_u8(address, byte)
    }

    pub fn cluster_bit(&self, ptr: ClusterPtr) -> Result<bool> {
        let byte = self
            .volume()
            .read_u8(self.superblock().cluster_bitmap_start + (ptr / 8) as VolumePtr)?;
        Ok(byte >> (ptr % 8) & 1 == 1)
    }

    pub(crate) fn set_cluster_bit(&mut self, ptr: ClusterPtr, value: u8) -> Result<()> {
        let total = self.superblock().cluster_count;
        if ptr < 0 || ptr >= total {
            return Err(FsError::OutOfRange {
                index: ptr as i64,
                max: total as i64 - 1,
            });
        }
        let address = self.superblock().cluster_bitmap_start + (ptr / 8) as VolumePtr;
        let byte = self.volume().read_u8(address)?;
        let mask = 1u8 << (ptr % 8);
        let byte = if value == 1 { byte | mask } else { byte & !mask };
        self.volume_mut().write_u8(address, byte)
    }

    /// First `count` free clusters, scanned through the cluster bitmap in
    /// 512-byte chunks. With `occupy` every hit is marked before the next
    /// one is located, so a single call never hands out the same cluster
    /// twice. Fails with `NotEnoughSpace` when fewer than `count` free
    /// clusters exist, leaving the bitmap untouched.
    pub fn find_free_clusters(&mut self, count: usize, occupy: bool) -> Result<Vec<ClusterPtr>> {
        let mut found = Vec::with_capacity(count);
        if count == 0 {
            return Ok(found);
        }

        let bitmap_bytes = self.superblock().cluster_bitmap_bytes();
        let total_bits = self.superblock().cluster_count as u64;
        let mut chunk_start = 0usize;

        'chunks: while chunk_start < bitmap_bytes {
            let chunk_len = BITMAP_SCAN_CHUNK.min(bitmap_bytes - chunk_start);
            let address = self.superblock().cluster_bitmap_start + chunk_start as VolumePtr;
            let mut buf = vec![0u8; chunk_len];
            self.volume().read_bytes(address, &mut buf)?;
            let mut bitmap = Bitmap::from_bytes(&buf);
            let base = chunk_start as u64 * 8;
            let mut dirty = false;

            while let Some(bit) = bitmap.first_zero() {
                if base + bit >= total_bits {
                    break 'chunks;
                }
                found.push((base + bit) as ClusterPtr);
                // marked in the working copy either way, so the scan
                // advances; written back only when occupying
                bitmap.set(bit, 1)?;
                dirty = occupy;
                if found.len() == count {
                    if dirty {
                        self.volume_mut().write_bytes(address, bitmap.as_bytes())?;
                    }
                    return Ok(found);
                }
            }

            if dirty {
                self.volume_mut().write_bytes(address, bitmap.as_bytes())?;
            }
            chunk_start += chunk_len;
        }

        // not enough space: roll the marks back
        if occupy {
            for &cluster in &found {
                self.set_cluster_bit(cluster, 0)?;
            }
        }
        Err(FsError::NotEnoughSpace)
    }

    pub fn free_clusters(&mut self, clusters: &[ClusterPtr]) -> Result<()> {
        for &cluster in clusters {
            self.set_cluster_bit(cluster, 0)?;
        }
        Ok(())
    }

    /// Extend the inode's chain by `ceil(extra_bytes / cluster_size)`
    /// clusters; returns the number of bytes actually backed by new
    /// clusters.
    ///
    /// Transactional: on any failure every cluster taken during this call
    /// is freed again and the inode is restored to its state at entry.
    pub fn allocate(&mut self, inode: &mut Inode, extra_bytes: VolumePtr) -> Result<VolumePtr> {
        if extra_bytes <= 0 {
            return Ok(0);
        }
        let cluster_size = self.superblock().cluster_size as i64;
        let needed = (extra_bytes + cluster_size - 1) / cluster_size;
        let ceiling = self.superblock().max_file_clusters();
        if inode.allocated_clusters as i64 + needed > ceiling {
            return Err(FsError::FileTooLarge {
                max_clusters: ceiling,
            });
        }

        let snapshot = *inode;
        let mut taken = Vec::new();
        match self.allocate_phases(inode, needed, &mut taken) {
            Ok(()) => {
                debug!(
                    "allocated {} clusters, inode now holds {}",
                    needed, inode.allocated_clusters
                );
                Ok(needed * cluster_size)
            }
            Err(err) => {
                self.free_clusters(&taken)?;
                *inode = snapshot;
                Err(err)
            }
        }
    }

    fn allocate_phases(
        &mut self,
        inode: &mut Inode,
        mut needed: i64,
        taken: &mut Vec<ClusterPtr>,
    ) -> Result<()> {
        let ptrs = self.superblock().ptrs_per_cluster();

        // phase 1: free direct slots
        for slot in 0..DIRECT_POINTERS {
            if needed == 0 {
                return Ok(());
            }
            if inode.direct[slot].is_none() {
                inode.direct[slot] = Some(self.take_cluster(taken)?);
                inode.allocated_clusters += 1;
                needed -= 1;
            }
        }

        // phase 2: the indirect1 table
        if needed > 0 {
            let table = match inode.indirect1 {
                Some(table) => table,
                None => {
                    let table = self.take_table_cluster(taken)?;
                    inode.indirect1 = Some(table);
                    table
                }
            };
            let mut slot = (inode.allocated_clusters as i64 - DIRECT_POINTERS as i64).clamp(0, ptrs);
            while needed > 0 && slot < ptrs {
                let cluster = self.take_cluster(taken)?;
                self.write_table_entry(table, slot, cluster)?;
                inode.allocated_clusters += 1;
                needed -= 1;
                slot += 1;
            }
        }

        // phase 3: the indirect2 tree
        if needed > 0 {
            let table2 = match inode.indirect2 {
                Some(table) => table,
                None => {
                    let table = self.take_table_cluster(taken)?;
                    inode.indirect2 = Some(table);
                    table
                }
            };
            let used_data = (inode.allocated_clusters as i64 - DIRECT_POINTERS as i64 - ptrs).max(0);
            // number of single tables already hanging off the double table
            let mut double_slot = (used_data + ptrs - 1) / ptrs;
            let single_slot = used_data % ptrs;

            // fill the tail of the last existing single table first
            if single_slot > 0 {
                let table = self.read_table_entry(table2, double_slot - 1)?;
                let mut slot = single_slot;
                while needed > 0 && slot < ptrs {
                    let cluster = self.take_cluster(taken)?;
                    self.write_table_entry(table, slot, cluster)?;
                    inode.allocated_clusters += 1;
                    needed -= 1;
                    slot += 1;
                }
            }

            // then append fresh single tables
            while needed > 0 {
                if double_slot >= ptrs {
                    return Err(FsError::NotEnoughSpace);
                }
                let table = self.take_table_cluster(taken)?;
                self.write_table_entry(table2, double_slot, table)?;
                double_slot += 1;
                let mut slot = 0;
                while needed > 0 && slot < ptrs {
                    let cluster = self.take_cluster(taken)?;
                    self.write_table_entry(table, slot, cluster)?;
                    inode.allocated_clusters += 1;
                    needed -= 1;
                    slot += 1;
                }
            }
        }

        Ok(())
    }

    fn take_cluster(&mut self, taken: &mut Vec<ClusterPtr>) -> Result<ClusterPtr> {
        let cluster = self.find_free_clusters(1, true)?[0];
        taken.push(cluster);
        Ok(cluster)
    }

    /// A pointer-table cluster starts zeroed so stale data of a previous
    /// owner can never be mistaken for pointers.
    fn take_table_cluster(&mut self, taken: &mut Vec<ClusterPtr>) -> Result<ClusterPtr> {
        let cluster = self.take_cluster(taken)?;
        let address = self.superblock().cluster_ptr_to_volume_ptr(cluster);
        let cluster_size = self.superblock().cluster_size as usize;
        self.volume_mut().fill_zero(address, cluster_size)?;
        Ok(cluster)
    }

    /// Trim the chain so the inode keeps exactly
    /// `ceil(target_size / cluster_size)` clusters, releasing tail data
    /// clusters and any pointer table that ends up empty. `size` is
    /// cleared unconditionally (the directory rewrite and file-removal
    /// paths rely on that). Returns the number of bytes still backed.
    pub fn shrink(&mut self, inode: &mut Inode, target_size: VolumePtr) -> Result<VolumePtr> {
        let cluster_size = self.superblock().cluster_size as i64;
        let ptrs = self.superblock().ptrs_per_cluster();
        let target = (target_size + cluster_size - 1) / cluster_size;
        let missing = |index: i64| FsError::ClusterIndexOutOfRange {
            index: index as ClusterPtr,
        };

        // indirect2 first, data clusters from the tail backward
        while inode.allocated_clusters as i64 > target {
            let under_indirect2 =
                inode.allocated_clusters as i64 - DIRECT_POINTERS as i64 - ptrs;
            if under_indirect2 <= 0 {
                break;
            }
            let table2 = inode
                .indirect2
                .ok_or_else(|| missing(inode.allocated_clusters as i64 - 1))?;
            let table_index = (under_indirect2 - 1) / ptrs;
            let slot = (under_indirect2 - 1) % ptrs;
            let table = self.read_table_entry(table2, table_index)?;
            let data = self.read_table_entry(table, slot)?;
            self.set_cluster_bit(data, 0)?;
            inode.allocated_clusters -= 1;
            if slot == 0 {
                self.set_cluster_bit(table, 0)?;
                if table_index == 0 {
                    self.set_cluster_bit(table2, 0)?;
                    inode.indirect2 = None;
                }
            }
        }

        // then the indirect1 table
        while inode.allocated_clusters as i64 > target {
            let under_indirect1 = inode.allocated_clusters as i64 - DIRECT_POINTERS as i64;
            if under_indirect1 <= 0 {
                break;
            }
            let table = inode
                .indirect1
                .ok_or_else(|| missing(inode.allocated_clusters as i64 - 1))?;
            let data = self.read_table_entry(table, under_indirect1 - 1)?;
            self.set_cluster_bit(data, 0)?;
            inode.allocated_clusters -= 1;
            if under_indirect1 == 1 {
                self.set_cluster_bit(table, 0)?;
                inode.indirect1 = None;
            }
        }

        // direct slots last
        while inode.allocated_clusters as i64 > target {
            let slot = inode.allocated_clusters as usize - 1;
            let data = inode.direct[slot].ok_or_else(|| missing(slot as i64))?;
            self.set_cluster_bit(data, 0)?;
            inode.direct[slot] = None;
            inode.allocated_clusters -= 1;
        }

        inode.size = 0;
        debug!("shrunk inode to {} clusters", inode.allocated_clusters);
        Ok(inode.allocated_clusters as i64 * cluster_size)
    }
}
