//! Create and format a new volume.

use std::path::Path;

use log::info;

use crate::error::{FsError, Result};
use crate::fs::{Filesystem, Volume, MIN_VOLUME_SIZE, VolumePtr};

/// Format a fresh volume at `image_path`: compute the geometry, write the
/// superblock over a zeroed file, occupy inode 0 and initialize the root
/// directory. Returns the mounted filesystem.
pub fn mkfs<P>(
    image_path: P,
    size: VolumePtr,
    cluster_size: i16,
    descriptor: &str,
) -> Result<Filesystem>
where
    P: AsRef<Path>,
{
    if size < MIN_VOLUME_SIZE {
        return Err(FsError::InvalidArgument(format!(
            "minimum volume size is {MIN_VOLUME_SIZE} bytes, got {size}"
        )));
    }
    if cluster_size <= 0 {
        return Err(FsError::InvalidArgument(format!(
            "cluster size must be positive, got {cluster_size}"
        )));
    }

    let volume = Volume::create(image_path.as_ref(), size)?;
    let mut fs = Filesystem::create(volume, descriptor, cluster_size)?;
    fs.write_structure()?;

    let mut root = fs.find_free_inode(true)?;
    fs.init_root_directory(&mut root)?;

    info!(
        "formatted {}: {} bytes, {} clusters of {} bytes, {} inodes",
        image_path.as_ref().display(),
        size,
        fs.superblock().cluster_count,
        fs.superblock().cluster_size,
        fs.superblock().total_inodes(),
    );
    Ok(fs)
}
