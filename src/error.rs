use thiserror::Error;

use crate::fs::ClusterPtr;

/// Which part of a lookup was missing: an intermediate path component or
/// the named target itself. The shell renders the two differently
/// (`PATH NOT FOUND` versus `FILE NOT FOUND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntry {
    PathComponent,
    Target,
}

/// Error taxonomy of the whole crate. The allocator and the directory
/// layer bubble these up unchanged; only the binary maps a subset to
/// user-facing strings.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("record decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("index out of range [{index}], maximal index is [{max}]")]
    OutOfRange { index: i64, max: i64 },
    #[error("no free inode is available")]
    NoFreeInode,
    #[error("not enough available space")]
    NotEnoughSpace,
    #[error("file cannot grow past {max_clusters} clusters")]
    FileTooLarge { max_clusters: i64 },
    #[error("directory entry with name {name} was not found")]
    DirectoryEntryNotFound { name: String, missing: MissingEntry },
    #[error("directory entry with name {name} already exists")]
    DuplicateDirectoryEntry { name: String },
    #[error("directory {name} is not empty")]
    DirectoryIsNotEmpty { name: String },
    #[error("directory {name} cannot be copied")]
    DirectoryCannotBeCopied { name: String },
    /// Internal growth signal of the data-write path; `write` resolves it
    /// by allocating and retrying, it must not reach API callers.
    #[error("cluster index [{index}] is outside the allocated range")]
    ClusterIndexOutOfRange { index: ClusterPtr },
    #[error("volume signature mismatch")]
    InvalidSignature,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, FsError>;
