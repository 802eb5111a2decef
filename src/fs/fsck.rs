//! Consistency checking: reconciles live reachability from the root
//! against the two allocation bitmaps.
//!
//! The walk keys its visited set on inode pointers, so the `.` / `..`
//! cycles of the directory graph terminate.

use std::collections::HashSet;
use std::fmt;

use crate::error::Result;
use crate::fs::{ClusterPtr, Filesystem, InodePtr};

/// One inconsistency found by [`Filesystem::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckViolation {
    /// Inode marked used in the bitmap but unreachable from the root.
    OrphanInode { inode: InodePtr },
    /// Something reachable is marked free: either the inode itself
    /// (`cluster` is `None`) or one of the clusters it owns.
    DanglingReference {
        inode: InodePtr,
        cluster: Option<ClusterPtr>,
    },
    /// Cluster marked used that no reachable inode owns. Only reported by
    /// the verbose check.
    OrphanCluster { cluster: ClusterPtr },
}

impl fmt::Display for CheckViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckViolation::OrphanInode { inode } => {
                write!(f, "inode {inode} is marked used but unreachable")
            }
            CheckViolation::DanglingReference {
                inode,
                cluster: None,
            } => write!(f, "inode {inode} is reachable but marked free"),
            CheckViolation::DanglingReference {
                inode,
                cluster: Some(cluster),
            } => write!(
                f,
                "cluster {cluster} of inode {inode} is marked free"
            ),
            CheckViolation::OrphanCluster { cluster } => {
                write!(f, "cluster {cluster} is marked used but owned by no inode")
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckReport {
    pub violations: Vec<CheckViolation>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl Filesystem {
    /// Verify the two mandatory directions: inode reachability must match
    /// the inode bitmap, and every cluster owned by a reachable inode
    /// must be marked in the cluster bitmap.
    pub fn check(&self) -> Result<CheckReport> {
        self.check_with(false)
    }

    /// [`Filesystem::check`] plus the reverse cluster pass: clusters
    /// marked used that no reachable inode owns are reported too.
    pub fn check_verbose(&self) -> Result<CheckReport> {
        self.check_with(true)
    }

    fn check_with(&self, verbose: bool) -> Result<CheckReport> {
        let mut reachable = HashSet::new();
        reachable.insert(self.root_inode_ptr());
        self.collect_reachable(self.root_inode_ptr(), &mut reachable)?;

        let mut violations = Vec::new();

        let inode_bitmap = self.read_inode_bitmap()?;
        for index in 0..self.superblock().total_inodes() {
            let marked = inode_bitmap.get(index as u64)?;
            let seen = reachable.contains(&(index as InodePtr));
            if marked && !seen {
                violations.push(CheckViolation::OrphanInode {
                    inode: index as InodePtr,
                });
            } else if !marked && seen {
                violations.push(CheckViolation::DanglingReference {
                    inode: index as InodePtr,
                    cluster: None,
                });
            }
        }

        let cluster_bitmap = self.read_cluster_bitmap()?;
        let mut owned = HashSet::new();
        for &inode_ptr in &reachable {
            let handle = self.load_inode(inode_ptr)?;
            let usage = self.cluster_usage(&handle.inode)?;
            for cluster in usage.all_clusters() {
                owned.insert(cluster);
                if !cluster_bitmap.get(cluster as u64)? {
                    violations.push(CheckViolation::DanglingReference {
                        inode: inode_ptr,
                        cluster: Some(cluster),
                    });
                }
            }
        }

        if verbose {
            for cluster in 0..self.superblock().cluster_count {
                if cluster_bitmap.get(cluster as u64)? && !owned.contains(&cluster) {
                    violations.push(CheckViolation::OrphanCluster { cluster });
                }
            }
        }

        Ok(CheckReport { violations })
    }

    fn collect_reachable(&self, ptr: InodePtr, out: &mut HashSet<InodePtr>) -> Result<()> {
        let handle = self.load_inode(ptr)?;
        for entry in self.read_all_entries(&handle.inode)? {
            if !out.insert(entry.inode_ptr) {
                continue;
            }
            let child = self.load_inode(entry.inode_ptr)?;
            if child.inode.is_dir() {
                self.collect_reachable(entry.inode_ptr, out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Volume, VolumePtr};

    fn test_fs(name: &str) -> Filesystem {
        let path = std::env::temp_dir().join(name);
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        let volume = Volume::create(&path, 10_000_000 as VolumePtr).unwrap();
        let mut fs = Filesystem::create(volume, "test volume", 512).unwrap();
        fs.write_structure().unwrap();
        let mut root = fs.find_free_inode(true).unwrap();
        fs.init_root_directory(&mut root).unwrap();
        fs
    }

    #[test]
    fn test_fresh_filesystem_is_clean() {
        let fs = test_fs("volfs_fsck_clean.img");
        assert!(fs.check().unwrap().is_clean());
        assert!(fs.check_verbose().unwrap().is_clean());
        fs.destroy().unwrap();
    }

    #[test]
    fn test_populated_filesystem_is_clean() {
        let mut fs = test_fs("volfs_fsck_populated.img");
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        let mut file = fs.open("/a/f", true).unwrap();
        file.write(&vec![0x33u8; 5000]).unwrap();
        drop(file);

        assert!(fs.check().unwrap().is_clean());
        assert!(fs.check_verbose().unwrap().is_clean());
        fs.destroy().unwrap();
    }

    #[test]
    fn test_cleared_cluster_bit_is_dangling_reference() {
        let mut fs = test_fs("volfs_fsck_dangling_cluster.img");
        fs.mkdir("/a").unwrap();
        let mut file = fs.open("/a/f", true).unwrap();
        file.write(&vec![0x33u8; 5000]).unwrap();
        let first_cluster = file.inode().direct[0].unwrap();
        drop(file);

        let root = fs.load_inode(fs.root_inode_ptr()).unwrap();
        let (_, a_entry) = fs.find_entry_by_name(&root.inode, "a").unwrap();
        let a = fs.load_inode(a_entry.inode_ptr).unwrap();
        let (_, f_entry) = fs.find_entry_by_name(&a.inode, "f").unwrap();

        assert!(fs.check().unwrap().is_clean());
        fs.set_cluster_bit(first_cluster, 0).unwrap();

        let report = fs.check().unwrap();
        assert!(report.violations.contains(&CheckViolation::DanglingReference {
            inode: f_entry.inode_ptr,
            cluster: Some(first_cluster),
        }));
        fs.destroy().unwrap();
    }

    #[test]
    fn test_cleared_inode_bit_is_dangling_reference() {
        let mut fs = test_fs("volfs_fsck_dangling_inode.img");
        fs.mkdir("/zombie").unwrap();
        let root = fs.load_inode(fs.root_inode_ptr()).unwrap();
        let (_, entry) = fs.find_entry_by_name(&root.inode, "zombie").unwrap();

        fs.free_inode(entry.inode_ptr).unwrap();
        let report = fs.check().unwrap();
        assert!(report.violations.contains(&CheckViolation::DanglingReference {
            inode: entry.inode_ptr,
            cluster: None,
        }));
        fs.destroy().unwrap();
    }

    #[test]
    fn test_set_but_unreachable_inode_is_orphan() {
        let mut fs = test_fs("volfs_fsck_orphan_inode.img");
        // occupy an inode without ever linking it into the tree
        let orphan = fs.find_free_inode(true).unwrap();

        let report = fs.check().unwrap();
        assert_eq!(
            report.violations,
            [CheckViolation::OrphanInode { inode: orphan.ptr }]
        );
        fs.destroy().unwrap();
    }

    #[test]
    fn test_orphan_cluster_only_in_verbose_mode() {
        let mut fs = test_fs("volfs_fsck_orphan_cluster.img");
        let leaked = fs.find_free_clusters(1, true).unwrap()[0];

        assert!(fs.check().unwrap().is_clean());
        let report = fs.check_verbose().unwrap();
        assert_eq!(
            report.violations,
            [CheckViolation::OrphanCluster { cluster: leaked }]
        );
        fs.destroy().unwrap();
    }
}
