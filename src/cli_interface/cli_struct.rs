use clap::Parser;

use crate::fs::DEFAULT_CLUSTER_SIZE;

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about = None)]
pub enum VolFsCli {
    /// create and format a new volume
    Mkfs(MkfsArgs),
    /// verify bitmap and directory-tree consistency
    Fsck(FsckArgs),
    /// print volume statistics and the cluster map of a path
    Info(InfoArgs),
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "create and format a new volume")]
pub struct MkfsArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// volume size, bare bytes or with a decimal kb/mb/gb suffix
    #[clap(short, long)]
    pub size: String,
    /// cluster size in bytes
    #[clap(short, long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    pub cluster_size: i16,
    /// human-readable volume label
    #[clap(short, long, default_value = "volfs volume")]
    pub descriptor: String,
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "verify the consistency of a volume")]
pub struct FsckArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// also report allocated clusters that no inode owns
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "describe a volume and one of its paths")]
pub struct InfoArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// path inside the volume to describe
    #[clap(long, default_value = "/")]
    pub path: String,
}


#[cfg(test)]
mod fsck_parse_args_tests {
    use super::*;

    #[test]
    fn test_long_parameter_form() {
        let args = VolFsCli::parse_from([
            "volfs",
            "fsck",
            "--image-file-path",
            "test.img",
            "--verbose",
        ]);
        assert_eq!(
            args,
            VolFsCli::Fsck(FsckArgs {
                image_file_path: "test.img".to_string(),
                verbose: true,
            })
        );
    }
}
