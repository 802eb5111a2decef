//! Whole-file transfers: copies inside the filesystem plus import and
//! export against the host filesystem.

use std::io::{Read, Write};
use std::path::Path;

use log::debug;

use crate::error::{FsError, Result};
use crate::fs::fs_api_impl::split_parent;
use crate::fs::{Filesystem, VolumePtr};

/// Chunk size of the copy loops.
const TRANSFER_CHUNK: usize = 4000;

impl Filesystem {
    /// Copy the file at `src` to `dst`. When `dst` names an existing
    /// directory the copy lands inside it under the source's name.
    /// An existing destination file is overwritten. Directories cannot
    /// be copied.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
        let source = self.resolve_path(src)?;
        if source.inode.is_dir() {
            return Err(FsError::DirectoryCannotBeCopied {
                name: src.to_string(),
            });
        }

        let destination = match self.resolve_path(dst) {
            Ok(handle) if handle.inode.is_dir() => {
                let (_, src_name) = split_parent(src);
                format!("{}/{}", dst.trim_end_matches('/'), src_name)
            }
            Ok(_) => dst.to_string(),
            Err(FsError::DirectoryEntryNotFound { .. }) => dst.to_string(),
            Err(err) => return Err(err),
        };

        let mut target = self.resolve_or_create_file(&destination)?;
        self.shrink(&mut target.inode, 0)?;

        let size = source.inode.size;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut offset: VolumePtr = 0;
        while offset < size {
            let want = TRANSFER_CHUNK.min((size - offset) as usize);
            let read = self.read_data(&source.inode, offset, &mut buf[..want])?;
            if read == 0 {
                break;
            }
            self.write_data(&mut target, offset, &buf[..read])?;
            offset += read as VolumePtr;
        }
        self.save_inode(&target)?;
        debug!("copied {src} to {destination}");
        Ok(())
    }

    /// Import a host file into the filesystem (the shell's `incp`). The
    /// destination is created if missing and overwritten otherwise.
    pub fn import_file<P: AsRef<Path>>(&mut self, host_src: P, dst: &str) -> Result<()> {
        let mut source = std::fs::File::open(host_src.as_ref())?;
        let mut target = self.resolve_or_create_file(dst)?;
        self.shrink(&mut target.inode, 0)?;

        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut offset: VolumePtr = 0;
        loop {
            let read = source.read(&mut buf)?;
            if read == 0 {
                break;
            }
            self.write_data(&mut target, offset, &buf[..read])?;
            offset += read as VolumePtr;
        }
        self.save_inode(&target)?;
        debug!("imported {} to {dst}", host_src.as_ref().display());
        Ok(())
    }

    /// Export a file out of the filesystem into the host (the shell's
    /// `outcp`).
    pub fn export_file<P: AsRef<Path>>(&self, src: &str, host_dst: P) -> Result<()> {
        let source = self.resolve_path(src)?;
        let mut target = std::fs::File::create(host_dst.as_ref())?;

        let size = source.inode.size;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut offset: VolumePtr = 0;
        while offset < size {
            let want = TRANSFER_CHUNK.min((size - offset) as usize);
            let read = self.read_data(&source.inode, offset, &mut buf[..want])?;
            if read == 0 {
                break;
            }
            target.write_all(&buf[..read])?;
            offset += read as VolumePtr;
        }
        debug!("exported {src} to {}", host_dst.as_ref().display());
        Ok(())
    }
}
