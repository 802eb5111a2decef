//! Byte-addressable access to the backing image file.
//!
//! Every call addresses the volume by absolute byte offset; no cursor
//! state survives between calls. Records are encoded with the packed
//! little-endian layout shared by the whole on-disk format.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use memmap2::MmapMut;

use crate::error::{FsError, Result};
use crate::fs::VolumePtr;

pub struct Volume {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
}

impl Volume {
    /// Create the image file, sized and zero-filled.
    pub fn create<P: AsRef<Path>>(path: P, size: VolumePtr) -> Result<Self> {
        if size <= 0 {
            return Err(FsError::InvalidArgument(format!(
                "volume size must be positive, got {size}"
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(size as u64)?;

        // Safety: the mapping is private to this process; the contract of
        // the crate is exclusive ownership of the image file.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Volume {
            file,
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing image file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        // Safety: see `create`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Volume {
            file,
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn size(&self) -> VolumePtr {
        self.mmap.len() as VolumePtr
    }

    fn range(&self, ptr: VolumePtr, len: usize) -> Result<std::ops::Range<usize>> {
        if ptr < 0 || ptr as usize + len > self.mmap.len() {
            return Err(FsError::OutOfRange {
                index: ptr + len as VolumePtr,
                max: self.size() - 1,
            });
        }
        Ok(ptr as usize..ptr as usize + len)
    }

    pub fn read_bytes(&self, ptr: VolumePtr, dst: &mut [u8]) -> Result<()> {
        let range = self.range(ptr, dst.len())?;
        dst.copy_from_slice(&self.mmap[range]);
        Ok(())
    }

    pub fn write_bytes(&mut self, ptr: VolumePtr, src: &[u8]) -> Result<()> {
        let range = self.range(ptr, src.len())?;
        self.mmap[range].copy_from_slice(src);
        Ok(())
    }

    pub fn read_u8(&self, ptr: VolumePtr) -> Result<u8> {
        let range = self.range(ptr, 1)?;
        Ok(self.mmap[range.start])
    }

    pub fn write_u8(&mut self, ptr: VolumePtr, value: u8) -> Result<()> {
        let range = self.range(ptr, 1)?;
        self.mmap[range.start] = value;
        Ok(())
    }

    /// Decode one fixed-layout record at `ptr`.
    pub fn read_record<T: Decode<()>>(&self, ptr: VolumePtr) -> Result<T> {
        if ptr < 0 || ptr as usize >= self.mmap.len() {
            return Err(FsError::OutOfRange {
                index: ptr,
                max: self.size() - 1,
            });
        }
        let (record, _) =
            bincode::decode_from_slice(&self.mmap[ptr as usize..], bincode::config::legacy())?;
        Ok(record)
    }

    /// Encode one fixed-layout record at `ptr`; returns the encoded length.
    pub fn write_record<T: Encode>(&mut self, ptr: VolumePtr, record: &T) -> Result<usize> {
        if ptr < 0 || ptr as usize >= self.mmap.len() {
            return Err(FsError::OutOfRange {
                index: ptr,
                max: self.size() - 1,
            });
        }
        let written = bincode::encode_into_slice(
            record,
            &mut self.mmap[ptr as usize..],
            bincode::config::legacy(),
        )?;
        Ok(written)
    }

    pub fn fill_zero(&mut self, ptr: VolumePtr, len: usize) -> Result<()> {
        let range = self.range(ptr, len)?;
        self.mmap[range].fill(0);
        Ok(())
    }

    /// Reset every byte of the volume to zero.
    pub fn truncate(&mut self) -> Result<()> {
        self.mmap.fill(0);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Close the volume and delete the image file.
    pub fn destroy(self) -> Result<()> {
        let Volume { file, mmap, path } = self;
        drop(mmap);
        drop(file);
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_volume(name: &str, size: VolumePtr) -> Volume {
        let path = std::env::temp_dir().join(name);
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        Volume::create(&path, size).unwrap()
    }

    #[test]
    fn test_create_is_zero_filled() {
        let volume = temp_volume("volfs_volume_zeroed.img", 4096);
        assert_eq!(volume.size(), 4096);
        let mut buf = [0xffu8; 64];
        volume.read_bytes(1000, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 64]);
        volume.destroy().unwrap();
    }

    #[test]
    fn test_byte_round_trip() {
        let mut volume = temp_volume("volfs_volume_bytes.img", 4096);
        volume.write_bytes(100, b"hello volume").unwrap();
        let mut buf = [0u8; 12];
        volume.read_bytes(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello volume");

        volume.write_u8(0, 0xaa).unwrap();
        assert_eq!(volume.read_u8(0).unwrap(), 0xaa);
        volume.destroy().unwrap();
    }

    #[test]
    fn test_record_round_trip_is_little_endian() {
        let mut volume = temp_volume("volfs_volume_record.img", 4096);
        volume.write_record(8, &0x01020304i32).unwrap();
        let mut raw = [0u8; 4];
        volume.read_bytes(8, &mut raw).unwrap();
        assert_eq!(raw, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(volume.read_record::<i32>(8).unwrap(), 0x01020304);
        volume.destroy().unwrap();
    }

    #[test]
    fn test_out_of_range_access_fails() {
        let mut volume = temp_volume("volfs_volume_range.img", 128);
        let mut buf = [0u8; 16];
        assert!(matches!(
            volume.read_bytes(120, &mut buf),
            Err(FsError::OutOfRange { .. })
        ));
        assert!(matches!(
            volume.write_bytes(-1, &buf),
            Err(FsError::OutOfRange { .. })
        ));
        volume.destroy().unwrap();
    }

    #[test]
    fn test_truncate_clears_every_byte() {
        let mut volume = temp_volume("volfs_volume_truncate.img", 256);
        volume.write_bytes(10, b"stale").unwrap();
        volume.truncate().unwrap();
        let mut buf = [0xffu8; 5];
        volume.read_bytes(10, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 5]);
        volume.destroy().unwrap();
    }

    #[test]
    fn test_reopen_sees_previous_writes() {
        let path = std::env::temp_dir().join("volfs_volume_reopen.img");
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        let mut volume = Volume::create(&path, 1024).unwrap();
        volume.write_bytes(512, b"persisted").unwrap();
        volume.close().unwrap();

        let reopened = Volume::open(&path).unwrap();
        let mut buf = [0u8; 9];
        reopened.read_bytes(512, &mut buf).unwrap();
        assert_eq!(&buf, b"persisted");
        reopened.destroy().unwrap();
    }
}
