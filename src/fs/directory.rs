//! Fixed-width directory entries stored in a directory inode's data
//! stream.
//!
//! A directory is an ordinary inode whose payload is a sequence of
//! 16-byte records; `size` stays a multiple of the record length. The
//! first two records of every directory are `.` and `..`.

use bincode::{Decode, Encode};

use crate::error::{FsError, MissingEntry, Result};
use crate::fs::{
    fixed_bytes, Filesystem, Inode, InodeHandle, InodeKind, InodePtr, DIRECTORY_ENTRY_SIZE,
    NAME_LENGTH,
};

pub const DOT: &str = ".";
pub const DOT_DOT: &str = "..";

/// 16 bytes on disk: the zero-padded name plus the target inode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DirectoryEntry {
    pub name: [u8; NAME_LENGTH],
    pub inode_ptr: InodePtr,
}

impl DirectoryEntry {
    pub fn new(name: &str, inode_ptr: InodePtr) -> DirectoryEntry {
        DirectoryEntry {
            name: name_to_bytes(name),
            inode_ptr,
        }
    }

    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(NAME_LENGTH);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Fixed 12-byte form used for storage and comparison; longer names are
/// truncated.
pub fn name_to_bytes(name: &str) -> [u8; NAME_LENGTH] {
    fixed_bytes(name.as_bytes())
}

impl Filesystem {
    /// Turn the inode into the root directory; both `.` and `..` point at
    /// itself.
    pub fn init_root_directory(&mut self, handle: &mut InodeHandle) -> Result<()> {
        handle.inode.kind = InodeKind::Root;
        self.save_inode(handle)?;
        self.append_entries(
            handle,
            &[
                DirectoryEntry::new(DOT, handle.ptr),
                DirectoryEntry::new(DOT_DOT, handle.ptr),
            ],
        )?;
        self.set_root(handle.ptr);
        Ok(())
    }

    /// Allocate a fresh directory inode, seed it with `.` and `..` and
    /// link it into `parent` under `name`.
    pub fn create_directory(&mut self, parent: &mut InodeHandle, name: &str) -> Result<InodeHandle> {
        let mut dir = self.find_free_inode(true)?;
        dir.inode.kind = InodeKind::Directory;
        self.save_inode(&dir)?;
        let dir_ptr = dir.ptr;
        self.append_entries(
            &mut dir,
            &[
                DirectoryEntry::new(DOT, dir_ptr),
                DirectoryEntry::new(DOT_DOT, parent.ptr),
            ],
        )?;
        self.append_entries(parent, &[DirectoryEntry::new(name, dir.ptr)])?;
        Ok(dir)
    }

    pub fn read_all_entries(&self, inode: &Inode) -> Result<Vec<DirectoryEntry>> {
        let mut buf = vec![0u8; inode.size as usize];
        self.read_data(inode, 0, &mut buf)?;
        let mut entries = Vec::with_capacity(buf.len() / DIRECTORY_ENTRY_SIZE);
        for record in buf.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            let (entry, _) = bincode::decode_from_slice(record, bincode::config::legacy())?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn find_entry_by_name(
        &self,
        inode: &Inode,
        name: &str,
    ) -> Result<(usize, DirectoryEntry)> {
        let target = name_to_bytes(name);
        self.read_all_entries(inode)?
            .into_iter()
            .enumerate()
            .find(|(_, entry)| entry.name == target)
            .ok_or_else(|| FsError::DirectoryEntryNotFound {
                name: name.to_string(),
                missing: MissingEntry::Target,
            })
    }

    pub fn find_entry_by_inode_ptr(
        &self,
        inode: &Inode,
        ptr: InodePtr,
    ) -> Result<(usize, DirectoryEntry)> {
        self.read_all_entries(inode)?
            .into_iter()
            .enumerate()
            .find(|(_, entry)| entry.inode_ptr == ptr)
            .ok_or_else(|| FsError::DirectoryEntryNotFound {
                name: format!("inode {ptr}"),
                missing: MissingEntry::Target,
            })
    }

    /// Append records to the end of the directory's stream.
    pub fn append_entries(
        &mut self,
        handle: &mut InodeHandle,
        entries: &[DirectoryEntry],
    ) -> Result<()> {
        let mut buf = Vec::with_capacity(entries.len() * DIRECTORY_ENTRY_SIZE);
        for entry in entries {
            buf.extend(bincode::encode_to_vec(entry, bincode::config::legacy())?);
        }
        self.append_data(handle, &buf)?;
        Ok(())
    }

    /// Drop `name` from the directory and rewrite the remaining records
    /// in order. Removing `.` or `..` is the caller's responsibility to
    /// prevent.
    pub fn remove_entry(
        &mut self,
        handle: &mut InodeHandle,
        name: &str,
    ) -> Result<DirectoryEntry> {
        let mut entries = self.read_all_entries(&handle.inode)?;
        let target = name_to_bytes(name);
        let position = entries
            .iter()
            .position(|entry| entry.name == target)
            .ok_or_else(|| FsError::DirectoryEntryNotFound {
                name: name.to_string(),
                missing: MissingEntry::Target,
            })?;
        let removed = entries.remove(position);
        self.save_entries(handle, &entries)?;
        Ok(removed)
    }

    /// Rewrite the directory stream from scratch.
    fn save_entries(&mut self, handle: &mut InodeHandle, entries: &[DirectoryEntry]) -> Result<()> {
        self.shrink(&mut handle.inode, 0)?;
        self.append_entries(handle, entries)
    }

    /// Move `src_name` out of one directory and into another under
    /// `dst_name`. Inside a single directory the record is renamed in
    /// place; across directories the record is removed and appended.
    pub fn rename_entry(
        &mut self,
        src_parent: &mut InodeHandle,
        src_name: &str,
        dst_parent: &mut InodeHandle,
        dst_name: &str,
    ) -> Result<()> {
        if self.find_entry_by_name(&dst_parent.inode, dst_name).is_ok() {
            return Err(FsError::DuplicateDirectoryEntry {
                name: dst_name.to_string(),
            });
        }

        if src_parent.ptr == dst_parent.ptr {
            let mut entries = self.read_all_entries(&src_parent.inode)?;
            let target = name_to_bytes(src_name);
            let position = entries
                .iter()
                .position(|entry| entry.name == target)
                .ok_or_else(|| FsError::DirectoryEntryNotFound {
                    name: src_name.to_string(),
                    missing: MissingEntry::Target,
                })?;
            entries[position].name = name_to_bytes(dst_name);
            self.save_entries(src_parent, &entries)?;
            dst_parent.inode = src_parent.inode;
            return Ok(());
        }

        let mut entry = self.remove_entry(src_parent, src_name)?;
        entry.name = name_to_bytes(dst_name);
        self.append_entries(dst_parent, &[entry])?;
        Ok(())
    }
}
