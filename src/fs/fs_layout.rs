//! The mounted filesystem: one volume, its superblock and the two
//! position markers (root and current working directory).

use log::info;

use crate::error::Result;
use crate::fs::{Bitmap, InodeHandle, InodePtr, SuperBlock, Volume, ROOT_INODE};

pub struct Filesystem {
    volume: Volume,
    superblock: SuperBlock,
    root_inode_ptr: InodePtr,
    current_inode_ptr: InodePtr,
}

/// Cluster and inode occupancy totals, derived from the two bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_clusters: i64,
    pub free_clusters: i64,
    pub total_inodes: i64,
    pub free_inodes: i64,
}

impl Filesystem {
    /// Compute the geometry for a fresh volume. Nothing is written until
    /// [`Filesystem::write_structure`].
    pub fn create(volume: Volume, descriptor: &str, cluster_size: i16) -> Result<Filesystem> {
        if cluster_size <= 0 {
            return Err(crate::error::FsError::InvalidArgument(format!(
                "cluster size must be positive, got {cluster_size}"
            )));
        }
        let superblock = SuperBlock::compute(descriptor, volume.size(), cluster_size);
        Ok(Filesystem {
            volume,
            superblock,
            root_inode_ptr: ROOT_INODE,
            current_inode_ptr: ROOT_INODE,
        })
    }

    /// Write the superblock of a just-computed layout. The whole metadata
    /// region is cleared first, so both bitmaps and the inode table start
    /// out all-zero even when an old volume is reformatted in place.
    pub fn write_structure(&mut self) -> Result<()> {
        self.volume.fill_zero(0, self.superblock.data_start as usize)?;
        self.volume.write_record(0, &self.superblock)?;
        Ok(())
    }

    /// Mount an existing volume.
    pub fn mount(volume: Volume) -> Result<Filesystem> {
        let superblock: SuperBlock = volume.read_record(0)?;
        superblock.validate_signature()?;
        info!(
            "mounted volume \"{}\": {} clusters of {} bytes, {} inodes",
            superblock.descriptor_str(),
            superblock.cluster_count,
            superblock.cluster_size,
            superblock.total_inodes(),
        );
        Ok(Filesystem {
            volume,
            superblock,
            root_inode_ptr: ROOT_INODE,
            current_inode_ptr: ROOT_INODE,
        })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn root_inode_ptr(&self) -> InodePtr {
        self.root_inode_ptr
    }

    pub fn current_inode_ptr(&self) -> InodePtr {
        self.current_inode_ptr
    }

    pub(crate) fn set_root(&mut self, ptr: InodePtr) {
        self.root_inode_ptr = ptr;
        self.current_inode_ptr = ptr;
    }

    pub(crate) fn set_current(&mut self, ptr: InodePtr) {
        self.current_inode_ptr = ptr;
    }

    pub(crate) fn volume(&self) -> &Volume {
        &self.volume
    }

    pub(crate) fn volume_mut(&mut self) -> &mut Volume {
        &mut self.volume
    }

    pub fn load_inode(&self, ptr: InodePtr) -> Result<InodeHandle> {
        let inode = self
            .volume
            .read_record(self.superblock.inode_ptr_to_volume_ptr(ptr))?;
        Ok(InodeHandle { ptr, inode })
    }

    pub fn save_inode(&mut self, handle: &InodeHandle) -> Result<()> {
        self.volume.write_record(
            self.superblock.inode_ptr_to_volume_ptr(handle.ptr),
            &handle.inode,
        )?;
        Ok(())
    }

    pub fn read_cluster_bitmap(&self) -> Result<Bitmap> {
        let mut buf = vec![0u8; self.superblock.cluster_bitmap_bytes()];
        self.volume
            .read_bytes(self.superblock.cluster_bitmap_start, &mut buf)?;
        Ok(Bitmap::from_bytes(&buf))
    }

    pub fn read_inode_bitmap(&self) -> Result<Bitmap> {
        let mut buf = vec![0u8; self.superblock.inode_bitmap_bytes()];
        self.volume
            .read_bytes(self.superblock.inode_bitmap_start, &mut buf)?;
        Ok(Bitmap::from_bytes(&buf))
    }

    pub fn statistics(&self) -> Result<VolumeStats> {
        let cluster_bitmap = self.read_cluster_bitmap()?;
        let inode_bitmap = self.read_inode_bitmap()?;
        let total_clusters = self.superblock.cluster_count as i64;
        let total_inodes = self.superblock.total_inodes();
        Ok(VolumeStats {
            total_clusters,
            free_clusters: total_clusters - cluster_bitmap.count_ones() as i64,
            total_inodes,
            free_inodes: total_inodes - inode_bitmap.count_ones() as i64,
        })
    }

    pub fn close(self) -> Result<()> {
        self.volume.close()
    }

    /// Close the filesystem and delete the backing image file.
    pub fn destroy(self) -> Result<()> {
        self.volume.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::fs::{InodeKind, VolumePtr, SUPERBLOCK_SIZE};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        path
    }

    #[test]
    fn test_write_structure_and_remount() {
        let path = temp_path("volfs_layout_remount.img");
        let volume = Volume::create(&path, 1_000_000 as VolumePtr).unwrap();
        let mut fs = Filesystem::create(volume, "remount test", 512).unwrap();
        fs.write_structure().unwrap();
        let mut root = fs.find_free_inode(true).unwrap();
        fs.init_root_directory(&mut root).unwrap();
        let superblock = *fs.superblock();
        fs.close().unwrap();

        let reopened = Filesystem::mount(Volume::open(&path).unwrap()).unwrap();
        assert_eq!(*reopened.superblock(), superblock);
        assert_eq!(reopened.root_inode_ptr(), ROOT_INODE);
        let root = reopened.load_inode(ROOT_INODE).unwrap();
        assert_eq!(root.inode.kind, InodeKind::Root);
        reopened.destroy().unwrap();
    }

    #[test]
    fn test_open_rejects_foreign_volume() {
        let path = temp_path("volfs_layout_foreign.img");
        let mut volume = Volume::create(&path, SUPERBLOCK_SIZE as VolumePtr + 64).unwrap();
        volume.write_bytes(0, b"notavolume").unwrap();
        assert!(matches!(
            Filesystem::mount(volume),
            Err(FsError::InvalidSignature)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_inode_save_load_round_trip() {
        let path = temp_path("volfs_layout_inode_io.img");
        let volume = Volume::create(&path, 1_000_000 as VolumePtr).unwrap();
        let mut fs = Filesystem::create(volume, "inode io", 512).unwrap();
        fs.write_structure().unwrap();

        let mut handle = fs.find_free_inode(true).unwrap();
        handle.inode.kind = InodeKind::Directory;
        handle.inode.size = 48;
        handle.inode.direct[0] = Some(12);
        handle.inode.allocated_clusters = 1;
        fs.save_inode(&handle).unwrap();

        let reloaded = fs.load_inode(handle.ptr).unwrap();
        assert_eq!(reloaded.inode, handle.inode);
        fs.destroy().unwrap();
    }

    #[test]
    fn test_statistics_track_allocation() {
        let path = temp_path("volfs_layout_stats.img");
        let volume = Volume::create(&path, 1_000_000 as VolumePtr).unwrap();
        let mut fs = Filesystem::create(volume, "stats", 512).unwrap();
        fs.write_structure().unwrap();

        let clean = fs.statistics().unwrap();
        assert_eq!(clean.total_clusters, 1855);
        assert_eq!(clean.free_clusters, 1855);
        assert_eq!(clean.total_inodes, 1202);
        assert_eq!(clean.free_inodes, 1202);

        let mut root = fs.find_free_inode(true).unwrap();
        fs.init_root_directory(&mut root).unwrap();

        let used = fs.statistics().unwrap();
        assert_eq!(used.free_inodes, clean.free_inodes - 1);
        // the root directory stream occupies one cluster
        assert_eq!(used.free_clusters, clean.free_clusters - 1);
        fs.destroy().unwrap();
    }
}
