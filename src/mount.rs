//! Mount an existing volume.

use std::path::Path;

use crate::error::Result;
use crate::fs::{Filesystem, Volume};

/// Open the image file at `image_path` and mount the filesystem inside
/// it. Fails with `InvalidSignature` when the file is not a formatted
/// volume.
pub fn mount<P>(image_path: P) -> Result<Filesystem>
where
    P: AsRef<Path>,
{
    Filesystem::mount(Volume::open(image_path)?)
}
