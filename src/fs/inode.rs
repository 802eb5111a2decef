//! Per-file metadata and the logical-to-physical cluster mapping.
//!
//! An inode addresses its data clusters through three levels: five direct
//! pointers, one singly-indirect table and one doubly-indirect table of
//! tables. With `P` pointers per cluster the logical index `k` maps to
//! `direct[k]` for `k < 5`, to entry `k - 5` of the indirect1 table for
//! `k < 5 + P`, and through the indirect2 tree beyond that.

use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};

use crate::error::{FsError, Result};
use crate::fs::{
    ClusterPtr, Filesystem, InodeKind, InodePtr, VolumePtr, CLUSTER_PTR_SIZE, DIRECT_POINTERS,
    UNUSED,
};

/// Fixed-width inode record. Cluster pointer fields are `None` in memory
/// and the `-1` sentinel on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub kind: InodeKind,
    /// Payload length in bytes; for directories always a multiple of the
    /// directory-entry size.
    pub size: VolumePtr,
    /// Number of data clusters reachable through the pointer tree,
    /// excluding the pointer-table clusters themselves.
    pub allocated_clusters: i32,
    pub direct: [Option<ClusterPtr>; DIRECT_POINTERS],
    pub indirect1: Option<ClusterPtr>,
    pub indirect2: Option<ClusterPtr>,
}

impl Inode {
    pub fn new(kind: InodeKind) -> Inode {
        Inode {
            kind,
            size: 0,
            allocated_clusters: 0,
            direct: [None; DIRECT_POINTERS],
            indirect1: None,
            indirect2: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

impl Default for Inode {
    fn default() -> Inode {
        Inode::new(InodeKind::File)
    }
}

fn encode_ptr<E: Encoder>(
    ptr: Option<ClusterPtr>,
    encoder: &mut E,
) -> std::result::Result<(), EncodeError> {
    ptr.unwrap_or(UNUSED).encode(encoder)
}

fn decode_ptr<Context, D: Decoder<Context = Context>>(
    decoder: &mut D,
) -> std::result::Result<Option<ClusterPtr>, DecodeError> {
    let raw = ClusterPtr::decode(decoder)?;
    Ok(if raw == UNUSED { None } else { Some(raw) })
}

impl Encode for Inode {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> std::result::Result<(), EncodeError> {
        (self.kind as u8).encode(encoder)?;
        self.size.encode(encoder)?;
        self.allocated_clusters.encode(encoder)?;
        for ptr in self.direct {
            encode_ptr(ptr, encoder)?;
        }
        encode_ptr(self.indirect1, encoder)?;
        encode_ptr(self.indirect2, encoder)
    }
}

impl<Context> Decode<Context> for Inode {
    fn decode<D: Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> std::result::Result<Inode, DecodeError> {
        let kind = InodeKind::try_from(u8::decode(decoder)?)
            .map_err(|err| DecodeError::OtherString(err.to_string()))?;
        let size = VolumePtr::decode(decoder)?;
        let allocated_clusters = i32::decode(decoder)?;
        let mut direct = [None; DIRECT_POINTERS];
        for slot in &mut direct {
            *slot = decode_ptr(decoder)?;
        }
        let indirect1 = decode_ptr(decoder)?;
        let indirect2 = decode_ptr(decoder)?;
        Ok(Inode {
            kind,
            size,
            allocated_clusters,
            direct,
            indirect1,
            indirect2,
        })
    }
}

/// An inode coupled with its table slot, so mutations can be persisted
/// back to the volume.
#[derive(Debug, Clone, Copy)]
pub struct InodeHandle {
    pub ptr: InodePtr,
    pub inode: Inode,
}

/// Full cluster map of one inode: the data clusters plus every
/// pointer-table cluster, grouped by level. Produced for diagnostics and
/// for the consistency checker.
#[derive(Debug, Default, Clone)]
pub struct ClusterUsage {
    pub direct: Vec<ClusterPtr>,
    pub indirect1: Option<IndirectTable>,
    pub indirect2: Option<DoubleIndirectTable>,
}

#[derive(Debug, Clone)]
pub struct IndirectTable {
    pub table: ClusterPtr,
    pub data: Vec<ClusterPtr>,
}

#[derive(Debug, Clone)]
pub struct DoubleIndirectTable {
    pub table: ClusterPtr,
    pub tables: Vec<IndirectTable>,
}

impl ClusterUsage {
    /// Every cluster the inode owns, pointer tables included.
    pub fn all_clusters(&self) -> Vec<ClusterPtr> {
        let mut clusters = self.direct.clone();
        if let Some(indirect1) = &self.indirect1 {
            clusters.push(indirect1.table);
            clusters.extend(&indirect1.data);
        }
        if let Some(indirect2) = &self.indirect2 {
            clusters.push(indirect2.table);
            for table in &indirect2.tables {
                clusters.push(table.table);
                clusters.extend(&table.data);
            }
        }
        clusters
    }

    pub fn data_cluster_count(&self) -> i64 {
        let mut count = self.direct.len() as i64;
        if let Some(indirect1) = &self.indirect1 {
            count += indirect1.data.len() as i64;
        }
        if let Some(indirect2) = &self.indirect2 {
            for table in &indirect2.tables {
                count += table.data.len() as i64;
            }
        }
        count
    }
}

impl Filesystem {
    /// Physical cluster backing logical cluster `index` of `inode`.
    ///
    /// Fails with `ClusterIndexOutOfRange` when `index` is not backed by
    /// an allocated cluster; the data-write path uses that as its growth
    /// signal.
    pub fn resolve_cluster(&self, inode: &Inode, index: i64) -> Result<ClusterPtr> {
        if index < 0 || index >= inode.allocated_clusters as i64 {
            return Err(FsError::ClusterIndexOutOfRange {
                index: index as ClusterPtr,
            });
        }
        let out_of_range = || FsError::ClusterIndexOutOfRange {
            index: index as ClusterPtr,
        };

        let direct_count = DIRECT_POINTERS as i64;
        if index < direct_count {
            return inode.direct[index as usize].ok_or_else(out_of_range);
        }

        let ptrs = self.superblock().ptrs_per_cluster();
        if index < direct_count + ptrs {
            let table = inode.indirect1.ok_or_else(out_of_range)?;
            return self.read_table_entry(table, index - direct_count);
        }

        let table2 = inode.indirect2.ok_or_else(out_of_range)?;
        let relative = index - direct_count - ptrs;
        let single = self.read_table_entry(table2, relative / ptrs)?;
        self.read_table_entry(single, relative % ptrs)
    }

    pub(crate) fn read_table_entry(&self, table: ClusterPtr, slot: i64) -> Result<ClusterPtr> {
        let address = self.superblock().cluster_ptr_to_volume_ptr(table)
            + slot * CLUSTER_PTR_SIZE as VolumePtr;
        self.volume().read_record(address)
    }

    pub(crate) fn write_table_entry(
        &mut self,
        table: ClusterPtr,
        slot: i64,
        value: ClusterPtr,
    ) -> Result<()> {
        let address = self.superblock().cluster_ptr_to_volume_ptr(table)
            + slot * CLUSTER_PTR_SIZE as VolumePtr;
        self.volume_mut().write_record(address, &value)?;
        Ok(())
    }

    /// Read bytes starting at byte `offset` of the inode's stream into
    /// `dst`, until `dst` is full or the allocated range runs out.
    /// Returns the number of bytes read.
    pub fn read_data(&self, inode: &Inode, offset: VolumePtr, dst: &mut [u8]) -> Result<usize> {
        let cluster_size = self.superblock().cluster_size as i64;
        let mut cluster_index = offset / cluster_size;
        let mut offset_in_cluster = offset % cluster_size;
        let mut read = 0usize;

        while read < dst.len() {
            let cluster = match self.resolve_cluster(inode, cluster_index) {
                Ok(cluster) => cluster,
                Err(FsError::ClusterIndexOutOfRange { .. }) => break,
                Err(err) => return Err(err),
            };
            let take = (dst.len() - read).min((cluster_size - offset_in_cluster) as usize);
            let address =
                self.superblock().cluster_ptr_to_volume_ptr(cluster) + offset_in_cluster;
            self.volume().read_bytes(address, &mut dst[read..read + take])?;
            read += take;
            cluster_index += 1;
            offset_in_cluster = 0;
        }
        Ok(read)
    }

    /// Write `src` at byte `offset` of the inode's stream, growing the
    /// cluster chain on demand. The inode record is persisted before
    /// returning, so a partial write that hits `NotEnoughSpace` leaves the
    /// written length observable in `size`.
    pub fn write_data(
        &mut self,
        handle: &mut InodeHandle,
        offset: VolumePtr,
        src: &[u8],
    ) -> Result<usize> {
        let cluster_size = self.superblock().cluster_size as i64;
        let mut cluster_index = offset / cluster_size;
        let mut offset_in_cluster = offset % cluster_size;
        let mut written = 0usize;

        while written < src.len() {
            let cluster = match self.resolve_cluster(&handle.inode, cluster_index) {
                Ok(cluster) => cluster,
                Err(FsError::ClusterIndexOutOfRange { .. }) => {
                    if let Err(err) = self.allocate(&mut handle.inode, cluster_size) {
                        self.save_inode(handle)?;
                        return Err(err);
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            let take = (src.len() - written).min((cluster_size - offset_in_cluster) as usize);
            let address =
                self.superblock().cluster_ptr_to_volume_ptr(cluster) + offset_in_cluster;
            self.volume_mut()
                .write_bytes(address, &src[written..written + take])?;
            written += take;
            cluster_index += 1;
            offset_in_cluster = 0;
            handle.inode.size = handle.inode.size.max(offset + written as i64);
        }

        self.save_inode(handle)?;
        Ok(written)
    }

    /// `write_data` at the end of the stream.
    pub fn append_data(&mut self, handle: &mut InodeHandle, src: &[u8]) -> Result<usize> {
        let offset = handle.inode.size;
        self.write_data(handle, offset, src)
    }

    /// Enumerate every cluster reachable from the inode, level by level.
    pub fn cluster_usage(&self, inode: &Inode) -> Result<ClusterUsage> {
        let ptrs = self.superblock().ptrs_per_cluster();
        let total = inode.allocated_clusters as i64;
        let missing = |index: i64| FsError::ClusterIndexOutOfRange {
            index: index as ClusterPtr,
        };

        let mut usage = ClusterUsage::default();

        let direct_count = total.min(DIRECT_POINTERS as i64);
        for index in 0..direct_count {
            usage
                .direct
                .push(inode.direct[index as usize].ok_or_else(|| missing(index))?);
        }

        let indirect1_count = (total - DIRECT_POINTERS as i64).clamp(0, ptrs);
        if indirect1_count > 0 {
            let table = inode
                .indirect1
                .ok_or_else(|| missing(DIRECT_POINTERS as i64))?;
            let mut data = Vec::with_capacity(indirect1_count as usize);
            for slot in 0..indirect1_count {
                data.push(self.read_table_entry(table, slot)?);
            }
            usage.indirect1 = Some(IndirectTable { table, data });
        }

        let indirect2_count = (total - DIRECT_POINTERS as i64 - ptrs).max(0);
        if indirect2_count > 0 {
            let table2 = inode
                .indirect2
                .ok_or_else(|| missing(DIRECT_POINTERS as i64 + ptrs))?;
            let table_count = (indirect2_count + ptrs - 1) / ptrs;
            let mut tables = Vec::with_capacity(table_count as usize);
            for table_index in 0..table_count {
                let table = self.read_table_entry(table2, table_index)?;
                let in_this_table = (indirect2_count - table_index * ptrs).min(ptrs);
                let mut data = Vec::with_capacity(in_this_table as usize);
                for slot in 0..in_this_table {
                    data.push(self.read_table_entry(table, slot)?);
                }
                tables.push(IndirectTable { table, data });
            }
            usage.indirect2 = Some(DoubleIndirectTable {
                table: table2,
                tables,
            });
        }

        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Volume, INODE_SIZE};

    fn test_fs(name: &str, size: VolumePtr, cluster_size: i16) -> Filesystem {
        let path = std::env::temp_dir().join(name);
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        let volume = Volume::create(&path, size).unwrap();
        let mut fs = Filesystem::create(volume, "test volume", cluster_size).unwrap();
        fs.write_structure().unwrap();
        fs
    }

    #[test]
    fn test_encoded_length_is_fixed() {
        let encoded =
            bincode::encode_to_vec(Inode::default(), bincode::config::legacy()).unwrap();
        assert_eq!(encoded.len(), INODE_SIZE);
    }

    #[test]
    fn test_fresh_inode_encodes_unused_sentinels() {
        let encoded =
            bincode::encode_to_vec(Inode::default(), bincode::config::legacy()).unwrap();
        // kind, size and cluster count first, then 7 pointer fields of -1
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..9], &0i64.to_le_bytes());
        assert_eq!(&encoded[9..13], &0i32.to_le_bytes());
        for field in encoded[13..].chunks_exact(4) {
            assert_eq!(field, &(-1i32).to_le_bytes());
        }
    }

    #[test]
    fn test_codec_round_trip() {
        let mut inode = Inode::new(InodeKind::Directory);
        inode.size = 4096;
        inode.allocated_clusters = 7;
        inode.direct = [Some(3), Some(9), Some(4), None, None];
        inode.indirect1 = Some(17);
        let encoded = bincode::encode_to_vec(inode, bincode::config::legacy()).unwrap();
        let (decoded, read): (Inode, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::legacy()).unwrap();
        assert_eq!(read, INODE_SIZE);
        assert_eq!(decoded, inode);
        assert_eq!(decoded.indirect2, None);
    }

    #[test]
    fn test_resolve_direct_cluster() {
        let fs = test_fs("volfs_inode_resolve_direct.img", 1_000_000, 512);
        let mut inode = Inode::default();
        inode.allocated_clusters = 3;
        inode.direct = [Some(10), Some(11), Some(12), None, None];
        assert_eq!(fs.resolve_cluster(&inode, 0).unwrap(), 10);
        assert_eq!(fs.resolve_cluster(&inode, 2).unwrap(), 12);
        assert!(matches!(
            fs.resolve_cluster(&inode, 3),
            Err(FsError::ClusterIndexOutOfRange { index: 3 })
        ));
        fs.destroy().unwrap();
    }

    #[test]
    fn test_resolve_indirect_clusters() {
        // 512-byte clusters hold 128 pointers each
        let mut fs = test_fs("volfs_inode_resolve_indirect.img", 1_000_000, 512);
        let mut inode = Inode::default();
        inode.allocated_clusters = 5 + 128 + 130;
        inode.direct = [Some(0), Some(1), Some(2), Some(3), Some(4)];
        inode.indirect1 = Some(20);
        inode.indirect2 = Some(21);

        // indirect1 table: logical 5..133 map to clusters 100..228
        for slot in 0..128 {
            fs.write_table_entry(20, slot, 100 + slot as ClusterPtr).unwrap();
        }
        // indirect2: two single tables at clusters 22 and 23
        fs.write_table_entry(21, 0, 22).unwrap();
        fs.write_table_entry(21, 1, 23).unwrap();
        for slot in 0..128 {
            fs.write_table_entry(22, slot, 300 + slot as ClusterPtr).unwrap();
        }
        fs.write_table_entry(23, 0, 500).unwrap();
        fs.write_table_entry(23, 1, 501).unwrap();

        assert_eq!(fs.resolve_cluster(&inode, 4).unwrap(), 4);
        assert_eq!(fs.resolve_cluster(&inode, 5).unwrap(), 100);
        assert_eq!(fs.resolve_cluster(&inode, 132).unwrap(), 227);
        assert_eq!(fs.resolve_cluster(&inode, 133).unwrap(), 300);
        assert_eq!(fs.resolve_cluster(&inode, 260).unwrap(), 427);
        assert_eq!(fs.resolve_cluster(&inode, 261).unwrap(), 500);
        assert_eq!(fs.resolve_cluster(&inode, 262).unwrap(), 501);
        assert!(fs.resolve_cluster(&inode, 263).is_err());
        fs.destroy().unwrap();
    }

    #[test]
    fn test_write_then_read_across_clusters() {
        let mut fs = test_fs("volfs_inode_write_read.img", 1_000_000, 512);
        let mut handle = fs.find_free_inode(true).unwrap();

        let payload: Vec<u8> = (0..1500u32).map(|value| (value % 251) as u8).collect();
        let written = fs.write_data(&mut handle, 0, &payload).unwrap();
        assert_eq!(written, 1500);
        assert_eq!(handle.inode.size, 1500);
        assert_eq!(handle.inode.allocated_clusters, 3);

        let mut readback = vec![0u8; 1500];
        let read = fs.read_data(&handle.inode, 0, &mut readback).unwrap();
        assert_eq!(read, 1500);
        assert_eq!(readback, payload);

        // the saved record must match the in-memory one
        let reloaded = fs.load_inode(handle.ptr).unwrap();
        assert_eq!(reloaded.inode, handle.inode);
        fs.destroy().unwrap();
    }

    #[test]
    fn test_write_at_offset_grows_size_monotonically() {
        let mut fs = test_fs("volfs_inode_write_offset.img", 1_000_000, 512);
        let mut handle = fs.find_free_inode(true).unwrap();

        fs.write_data(&mut handle, 0, &[0xaa; 600]).unwrap();
        assert_eq!(handle.inode.size, 600);
        fs.write_data(&mut handle, 100, &[0xbb; 50]).unwrap();
        // overwrite inside the existing range must not shrink the file
        assert_eq!(handle.inode.size, 600);

        let mut readback = vec![0u8; 600];
        fs.read_data(&handle.inode, 0, &mut readback).unwrap();
        assert_eq!(&readback[..100], &[0xaa; 100][..]);
        assert_eq!(&readback[100..150], &[0xbb; 50][..]);
        assert_eq!(&readback[150..], &[0xaa; 450][..]);
        fs.destroy().unwrap();
    }

    #[test]
    fn test_append_data() {
        let mut fs = test_fs("volfs_inode_append.img", 1_000_000, 512);
        let mut handle = fs.find_free_inode(true).unwrap();
        fs.append_data(&mut handle, b"first").unwrap();
        fs.append_data(&mut handle, b"-second").unwrap();
        assert_eq!(handle.inode.size, 12);

        let mut readback = vec![0u8; 12];
        fs.read_data(&handle.inode, 0, &mut readback).unwrap();
        assert_eq!(&readback, b"first-second");
        fs.destroy().unwrap();
    }

    #[test]
    fn test_cluster_usage_counts_match() {
        let mut fs = test_fs("volfs_inode_usage.img", 1_000_000, 512);
        let mut handle = fs.find_free_inode(true).unwrap();
        // 140 clusters: 5 direct + 128 indirect1 + 7 indirect2
        let payload = vec![0x5au8; 140 * 512];
        fs.write_data(&mut handle, 0, &payload).unwrap();
        assert_eq!(handle.inode.allocated_clusters, 140);

        let usage = fs.cluster_usage(&handle.inode).unwrap();
        assert_eq!(usage.data_cluster_count(), 140);
        assert_eq!(usage.direct.len(), 5);
        let indirect1 = usage.indirect1.as_ref().unwrap();
        assert_eq!(indirect1.data.len(), 128);
        let indirect2 = usage.indirect2.as_ref().unwrap();
        assert_eq!(indirect2.tables.len(), 1);
        assert_eq!(indirect2.tables[0].data.len(), 7);
        // 140 data clusters + indirect1 table + indirect2 table + 1 single table
        assert_eq!(usage.all_clusters().len(), 143);
        fs.destroy().unwrap();
    }
}
