//! ScatterFS CLI - Command line access to a local cluster
//!
//! Every invocation starts all hosts of the cluster in-process below a base
//! directory, runs one command through the client and exits. State persists
//! in the base directory between invocations.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use scatterfs_client::{FsClient, OpenFlags};
use scatterfs_common::{DistributorConfig, FsConfig, Metadata};
use scatterfs_daemon::LoopbackTransport;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bytes moved per read call by `cat`
const READ_BUFFER: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "scatterfs")]
#[command(about = "ScatterFS local cluster CLI")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "SCATTERFS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the state of every host
    #[arg(long, env = "SCATTERFS_BASE_DIR", default_value = "./scatterfs-data")]
    base_dir: PathBuf,

    /// Number of hosts (overrides the configuration file)
    #[arg(long)]
    hosts: Option<u32>,

    /// Chunk size in bytes (overrides the configuration file)
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Host the client runs on (overrides the configuration file)
    #[arg(long)]
    localhost: Option<u32>,

    /// Place everything on the client's local host
    #[arg(long)]
    local_only: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a local file into the cluster
    Put {
        /// Local source file
        source: PathBuf,
        /// Destination path in the cluster
        path: String,
        /// Append instead of replacing
        #[arg(short, long)]
        append: bool,
    },
    /// Print a file to stdout
    Cat {
        path: String,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show type, size and modification time
        #[arg(short, long)]
        long: bool,
    },
    /// Show the metadata record of a path
    Stat {
        path: String,
    },
    /// Remove a file
    Rm {
        path: String,
    },
    /// Create a directory
    Mkdir {
        path: String,
        /// Permission bits (octal)
        #[arg(short, long, default_value = "755")]
        mode: String,
    },
    /// Remove an empty directory
    Rmdir {
        path: String,
    },
    /// Set the size of a file
    Truncate {
        path: String,
        size: u64,
    },
    /// Show chunk space of the cluster
    Df,
}

/// Format bytes as a human-readable size string.
fn format_size(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8).with_context(|| format!("invalid octal mode '{mode}'"))
}

fn load_config(args: &Args) -> Result<FsConfig> {
    let mut config = match &args.config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => FsConfig::default(),
    };
    if let Some(hosts) = args.hosts {
        config.host_count = hosts;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(localhost) = args.localhost {
        config.localhost = localhost;
    }
    if args.local_only {
        config.distributor = DistributorConfig::LocalOnly;
    }
    config.validate()?;
    Ok(config)
}

fn print_stat(path: &str, md: &Metadata) {
    println!("Path:   {path}");
    println!("Type:   {}", md.file_type());
    println!("Mode:   {:o}", md.mode & 0o7777);
    println!("Size:   {} ({})", md.size, format_size(md.size));
    println!("Links:  {}", md.link_count);
    println!("Owner:  {}:{}", md.uid, md.gid);
    println!("Access: {}", md.atime);
    println!("Modify: {}", md.mtime);
    println!("Change: {}", md.ctime);
}

async fn run(client: &FsClient, command: Commands) -> Result<()> {
    match command {
        Commands::Put {
            source,
            path,
            append,
        } => {
            let data = tokio::fs::read(&source)
                .await
                .with_context(|| format!("reading {}", source.display()))?;
            let flags = if append {
                OpenFlags::CREATE | OpenFlags::APPEND
            } else {
                OpenFlags::CREATE | OpenFlags::TRUNC
            };
            let fd = client.open(&path, flags, 0o644).await?;
            let written = client.write(fd, &data).await;
            client.close(fd)?;
            info!("Wrote {} bytes to {}", written?, path);
        }
        Commands::Cat { path } => {
            let fd = client.open(&path, OpenFlags::empty(), 0).await?;
            let mut buf = vec![0u8; READ_BUFFER];
            let mut stdout = std::io::stdout().lock();
            loop {
                let n = client.read(fd, &mut buf).await?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
            stdout.flush()?;
            client.close(fd)?;
        }
        Commands::Ls { path, long } => {
            let fd = client.opendir(&path).await?;
            while let Some(entry) = client.readdir(fd)? {
                if long {
                    println!(
                        "{:<4} {:>12} {:>12} {}",
                        entry.file_type, entry.size, entry.mtime, entry.name
                    );
                } else {
                    println!("{}", entry.name);
                }
            }
            let file = client.files().get(fd)?;
            if let Some(dir) = file.dir().filter(|d| d.is_partial()) {
                warn!(
                    "Listing of {} is incomplete, hosts {:?} did not answer",
                    path,
                    dir.unreachable_hosts()
                );
            }
            client.close(fd)?;
        }
        Commands::Stat { path } => {
            let md = client.stat(&path).await?;
            print_stat(&path, &md);
        }
        Commands::Rm { path } => client.unlink(&path).await?,
        Commands::Mkdir { path, mode } => client.mkdir(&path, parse_mode(&mode)?).await?,
        Commands::Rmdir { path } => client.rmdir(&path).await?,
        Commands::Truncate { path, size } => client.truncate(&path, size).await?,
        Commands::Df => {
            let stat = client.statfs().await?;
            let total = stat.chunk_total * stat.chunk_size;
            let free = stat.chunk_free * stat.chunk_size;
            println!("Chunk size: {}", format_size(stat.chunk_size));
            println!("Chunks:     {} total, {} free", stat.chunk_total, stat.chunk_free);
            println!("Space:      {} total, {} free", format_size(total), format_size(free));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    if args.base_dir.as_os_str().is_empty() {
        bail!("base directory must not be empty");
    }
    std::fs::create_dir_all(&args.base_dir)
        .with_context(|| format!("creating {}", args.base_dir.display()))?;

    let transport = Arc::new(LoopbackTransport::local_cluster(&config, &args.base_dir)?);
    let client = FsClient::from_config(&config, transport)?;

    run(&client, args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "scatterfs",
            "--hosts",
            "4",
            "--chunk-size",
            "4096",
            "--local-only",
            "df",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.host_count, 4);
        assert_eq!(config.chunk_size, 4096);
        assert!(matches!(config.distributor, DistributorConfig::LocalOnly));

        let bad = Args::parse_from(["scatterfs", "--chunk-size", "1000", "df"]);
        assert!(load_config(&bad).is_err());
    }

    #[test]
    fn test_local_only_uses_chosen_host() {
        let args = Args::parse_from([
            "scatterfs",
            "--hosts",
            "3",
            "--localhost",
            "2",
            "--local-only",
            "df",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.localhost, 2);
        let distributor = scatterfs_placement::build_distributor(&config).unwrap();
        assert_eq!(distributor.locate_file_metadata("/f"), 2);
        assert_eq!(distributor.locate_data("/f", 9), 2);

        let outside = Args::parse_from(["scatterfs", "--hosts", "2", "--localhost", "2", "df"]);
        assert!(load_config(&outside).is_err());
    }
}
