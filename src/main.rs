use clap::Parser;

use volfs::cli_interface::{parse_size, user_message, VolFsCli};
use volfs::mkfs::mkfs;
use volfs::mount::mount;

fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();

    match VolFsCli::parse() {
        VolFsCli::Mkfs(args) => {
            let size = parse_size(&args.size)?;
            let fs = mkfs(&args.image_file_path, size, args.cluster_size, &args.descriptor)?;
            let superblock = fs.superblock();
            println!(
                "formatted {}: {} clusters of {} bytes, {} inodes",
                args.image_file_path,
                superblock.cluster_count,
                superblock.cluster_size,
                superblock.total_inodes(),
            );
            fs.close()?;
        }
        VolFsCli::Fsck(args) => {
            let fs = mount(&args.image_file_path)?;
            let report = if args.verbose {
                fs.check_verbose()?
            } else {
                fs.check()?
            };
            fs.close()?;
            if report.is_clean() {
                println!("OK");
            } else {
                for violation in &report.violations {
                    println!("{violation}");
                }
                std::process::exit(1);
            }
        }
        VolFsCli::Info(args) => {
            let fs = mount(&args.image_file_path)?;
            let stats = fs.statistics()?;
            println!(
                "clusters: {} total, {} free; inodes: {} total, {} free",
                stats.total_clusters, stats.free_clusters, stats.total_inodes, stats.free_inodes,
            );
            match fs.data_clusters_info(&args.path) {
                Ok(usage) => {
                    println!("{}: {} data clusters", args.path, usage.data_cluster_count());
                    println!("  direct: {:?}", usage.direct);
                    if let Some(indirect1) = &usage.indirect1 {
                        println!(
                            "  indirect1 table {}: {} clusters",
                            indirect1.table,
                            indirect1.data.len()
                        );
                    }
                    if let Some(indirect2) = &usage.indirect2 {
                        println!(
                            "  indirect2 table {}: {} tables",
                            indirect2.table,
                            indirect2.tables.len()
                        );
                    }
                }
                Err(err) => {
                    println!("{}", user_message(&err));
                    fs.close()?;
                    std::process::exit(1);
                }
            }
            fs.close()?;
        }
    }

    Ok(())
}
