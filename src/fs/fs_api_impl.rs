//! Path resolution and the file API consumed by the shell layer.
//!
//! Paths use `/` as separator; a leading `/` resolves from the root,
//! anything else from the current working directory. Empty fragments are
//! skipped, and `.` / `..` need no special casing because every directory
//! stores them as ordinary entries.

use log::debug;

use crate::error::{FsError, MissingEntry, Result};
use crate::fs::directory::{DOT, DOT_DOT};
use crate::fs::{
    ClusterUsage, DirectoryEntry, Filesystem, Inode, InodeHandle, InodePtr, VolumePtr,
};

/// Directory-listing record handed to callers of [`File::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: i64,
    is_dir: bool,
}

impl FileInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Sequential handle over one inode. Reads and writes share a single
/// offset that advances with each call.
pub struct File<'fs> {
    fs: &'fs mut Filesystem,
    handle: InodeHandle,
    offset: VolumePtr,
}

/// Parent path (with trailing separator) and final fragment of `path`.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(index) => (&path[..=index], &path[index + 1..]),
        None => ("", path),
    }
}

impl Filesystem {
    pub(crate) fn resolve_path(&self, path: &str) -> Result<InodeHandle> {
        let start = if path.starts_with('/') {
            self.root_inode_ptr()
        } else {
            self.current_inode_ptr()
        };
        self.resolve_path_from(start, path)
    }

    /// Walk `path` fragment by fragment. A lookup that fails before the
    /// final fragment is a missing path component, not a missing target.
    fn resolve_path_from(&self, start: InodePtr, path: &str) -> Result<InodeHandle> {
        let mut current = self.load_inode(start)?;
        let fragments: Vec<&str> = path
            .split('/')
            .filter(|fragment| !fragment.is_empty())
            .collect();
        for (position, fragment) in fragments.iter().enumerate() {
            let (_, entry) = match self.find_entry_by_name(&current.inode, fragment) {
                Ok(found) => found,
                Err(FsError::DirectoryEntryNotFound { name, .. })
                    if position + 1 < fragments.len() =>
                {
                    return Err(FsError::DirectoryEntryNotFound {
                        name,
                        missing: MissingEntry::PathComponent,
                    });
                }
                Err(err) => return Err(err),
            };
            current = self.load_inode(entry.inode_ptr)?;
        }
        Ok(current)
    }

    /// Resolve the parent directory of a mutating operation. Any missing
    /// entry on it, the final fragment included, is a missing path
    /// component from the caller's point of view.
    fn resolve_parent(&self, parent_path: &str) -> Result<InodeHandle> {
        self.resolve_path(parent_path).map_err(|err| match err {
            FsError::DirectoryEntryNotFound { name, .. } => FsError::DirectoryEntryNotFound {
                name,
                missing: MissingEntry::PathComponent,
            },
            other => other,
        })
    }

    /// Whether `path` resolves to an inode.
    pub fn exists(&self, path: &str) -> Result<bool> {
        match self.resolve_path(path) {
            Ok(_) => Ok(true),
            Err(FsError::DirectoryEntryNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Resolve `path`, creating a missing final fragment as an empty file
    /// in its (existing) parent directory.
    pub(crate) fn resolve_or_create_file(&mut self, path: &str) -> Result<InodeHandle> {
        match self.resolve_path(path) {
            Ok(handle) => Ok(handle),
            Err(FsError::DirectoryEntryNotFound { .. }) => {
                let (parent_path, name) = split_parent(path);
                if name.is_empty() {
                    return Err(FsError::InvalidArgument(
                        "cannot create a file with an empty name".into(),
                    ));
                }
                let mut parent = self.resolve_parent(parent_path)?;
                let file = self.find_free_inode(true)?;
                self.append_entries(&mut parent, &[DirectoryEntry::new(name, file.ptr)])?;
                debug!("created file {path}");
                Ok(file)
            }
            Err(err) => Err(err),
        }
    }

    /// Open `path`. With `create`, a missing final fragment is created as
    /// an empty file in its (existing) parent directory.
    pub fn open(&mut self, path: &str, create: bool) -> Result<File<'_>> {
        let handle = if create {
            self.resolve_or_create_file(path)?
        } else {
            self.resolve_path(path)?
        };
        Ok(File {
            fs: self,
            handle,
            offset: 0,
        })
    }

    /// Create a directory at `path`; the parent must exist.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent_path, name) = split_parent(path);
        if name.is_empty() {
            return Err(FsError::InvalidArgument(
                "cannot create a directory with an empty name".into(),
            ));
        }
        let mut parent = self.resolve_parent(parent_path)?;
        if self.find_entry_by_name(&parent.inode, name).is_ok() {
            return Err(FsError::DuplicateDirectoryEntry {
                name: name.to_string(),
            });
        }
        self.create_directory(&mut parent, name)?;
        debug!("created directory {path}");
        Ok(())
    }

    /// Remove the file or directory at `path`. Directories must contain
    /// nothing but `.` and `..`. The inode's clusters are released before
    /// the inode itself.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (parent_path, name) = split_parent(path);
        let mut parent = self.resolve_parent(parent_path)?;
        let mut target = self.resolve_path(path)?;

        if target.inode.is_dir() {
            let entries = self.read_all_entries(&target.inode)?;
            if entries.len() != 2 {
                return Err(FsError::DirectoryIsNotEmpty {
                    name: path.to_string(),
                });
            }
        }

        self.shrink(&mut target.inode, 0)?;
        self.free_inode(target.ptr)?;
        self.remove_entry(&mut parent, name)?;
        debug!("removed {path}");
        Ok(())
    }

    /// Move the inode at `src` to `dst`. Fails when `dst` already exists,
    /// and refuses to move a directory into its own subtree.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_parent_path, src_name) = split_parent(src);
        let (dst_parent_path, dst_name) = split_parent(dst);
        if dst_name.is_empty() {
            return Err(FsError::InvalidArgument(
                "cannot rename to an empty name".into(),
            ));
        }

        let moved = self.resolve_path(src)?;
        let mut src_parent = self.resolve_parent(src_parent_path)?;
        let mut dst_parent = self.resolve_parent(dst_parent_path)?;
        if moved.inode.is_dir() {
            self.ensure_not_descendant(moved.ptr, dst_parent.ptr)?;
        }

        self.rename_entry(&mut src_parent, src_name, &mut dst_parent, dst_name)?;
        debug!("renamed {src} to {dst}");
        Ok(())
    }

    /// Walk `..` from `start` up to the root; fail if `ancestor` occurs
    /// on the way (it would make the move create a cycle).
    fn ensure_not_descendant(&self, ancestor: InodePtr, start: InodePtr) -> Result<()> {
        let mut current = start;
        loop {
            if current == ancestor {
                return Err(FsError::InvalidArgument(
                    "cannot move a directory into its own subtree".into(),
                ));
            }
            if current == self.root_inode_ptr() {
                return Ok(());
            }
            let handle = self.load_inode(current)?;
            let (_, dotdot) = self.find_entry_by_name(&handle.inode, DOT_DOT)?;
            if dotdot.inode_ptr == current {
                return Ok(());
            }
            current = dotdot.inode_ptr;
        }
    }

    /// Update the current working directory.
    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        let handle = self.resolve_path(path)?;
        self.set_current(handle.ptr);
        Ok(())
    }

    /// Absolute path of `path`, rebuilt by walking `..` back to the root
    /// and reversing the names found on the way.
    pub fn abs(&self, path: &str) -> Result<String> {
        let mut current = self.resolve_path(path)?;
        let mut fragments = Vec::new();
        while current.ptr != self.root_inode_ptr() {
            let parent = self.resolve_path_from(current.ptr, DOT_DOT)?;
            let (_, entry) = self.find_entry_by_inode_ptr(&parent.inode, current.ptr)?;
            fragments.push(entry.name_str());
            current = parent;
        }
        fragments.reverse();
        Ok(format!("/{}", fragments.join("/")))
    }

    /// Absolute path of the current working directory.
    pub fn pwd(&self) -> Result<String> {
        self.abs(DOT)
    }

    /// Diagnostic view of the cluster map backing `path`.
    pub fn data_clusters_info(&self, path: &str) -> Result<ClusterUsage> {
        let handle = self.resolve_path(path)?;
        self.cluster_usage(&handle.inode)
    }
}

impl File<'_> {
    /// Read up to `dst.len()` bytes at the current offset and advance it.
    /// `Ok(0)` signals end of file.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let size = self.handle.inode.size;
        if self.offset >= size {
            return Ok(0);
        }
        let want = dst.len().min((size - self.offset) as usize);
        let read = self
            .fs
            .read_data(&self.handle.inode, self.offset, &mut dst[..want])?;
        self.offset += read as VolumePtr;
        Ok(read)
    }

    /// Read the remainder of the file.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let remaining = (self.handle.inode.size - self.offset).max(0) as usize;
        let mut buf = vec![0u8; remaining];
        let read = self.read(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Write `src` at the current offset, growing the file as needed, and
    /// advance the offset.
    pub fn write(&mut self, src: &[u8]) -> Result<usize> {
        let written = self.fs.write_data(&mut self.handle, self.offset, src)?;
        self.offset += written as VolumePtr;
        Ok(written)
    }

    /// List the directory behind this handle.
    pub fn read_dir(&self) -> Result<Vec<FileInfo>> {
        let entries = self.fs.read_all_entries(&self.handle.inode)?;
        let mut infos = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = self.fs.load_inode(entry.inode_ptr)?;
            infos.push(FileInfo {
                name: entry.name_str(),
                size: child.inode.size,
                is_dir: child.inode.is_dir(),
            });
        }
        Ok(infos)
    }

    pub fn is_dir(&self) -> bool {
        self.handle.inode.is_dir()
    }

    pub fn size(&self) -> i64 {
        self.handle.inode.size
    }

    pub fn inode(&self) -> &Inode {
        &self.handle.inode
    }
}
