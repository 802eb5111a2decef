//! Command-line surface of the volfs binary.

mod cli_struct;

pub use cli_struct::*;

use byte_unit::Byte;

use crate::error::{FsError, MissingEntry, Result};
use crate::fs::VolumePtr;

/// Parse a volume size: bare bytes or a decimal `kb`/`mb`/`gb` suffix
/// (powers of ten, so `1mb` is 1 000 000 bytes).
pub fn parse_size(input: &str) -> Result<VolumePtr> {
    let byte = Byte::from_str(&input.to_uppercase()).map_err(|err| {
        FsError::InvalidArgument(format!("malformed size {input:?}: {err}"))
    })?;
    Ok(byte.get_bytes() as VolumePtr)
}

/// The short strings the shell layer prints for the common failure
/// modes; everything else is surfaced verbatim. A lookup that died on an
/// intermediate path component is a missing path, one that died on the
/// target itself is a missing file.
pub fn user_message(err: &FsError) -> String {
    match err {
        FsError::DirectoryEntryNotFound {
            missing: MissingEntry::PathComponent,
            ..
        } => "PATH NOT FOUND".to_string(),
        FsError::DirectoryEntryNotFound {
            missing: MissingEntry::Target,
            ..
        } => "FILE NOT FOUND".to_string(),
        FsError::DuplicateDirectoryEntry { .. } => "EXIST".to_string(),
        FsError::DirectoryIsNotEmpty { .. } => "NOT EMPTY".to_string(),
        FsError::DirectoryCannotBeCopied { .. } => "DIRECTORY CANNOT BE COPIED".to_string(),
        FsError::NotEnoughSpace => "NOT ENOUGH AVAILABLE SPACE".to_string(),
        other => other.to_string(),
    }
}
