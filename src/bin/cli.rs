//! xlog CLI
//!
//! Inspects and maintains a commit log directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use xlog::commitlog::{Compactor, NamespaceCompactor};
use xlog::offset::{LogOffsetManager, OffsetManager};
use xlog::scheduler::compact_once;
use xlog::{CommitLog, Config, Result, XlogError};

/// xlog CLI
#[derive(Parser, Debug)]
#[command(name = "xlog")]
#[command(about = "Inspect and maintain an xlog commit log")]
#[command(version)]
struct Args {
    /// Path to the commit log directory
    #[arg(short, long)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the oldest offset on disk
    Oldest,

    /// Print the offset of the newest entry
    Current,

    /// Print the entry stored at an offset
    Show {
        /// The offset to show
        offset: u64,
    },

    /// List segments with their offsets and sizes
    Segments,

    /// Compact every rotated segment below the safe offset
    Compact {
        /// Oldest offset that must be preserved (defaults to the slowest sink's committed offset)
        #[arg(short, long)]
        safe_offset: Option<u64>,
    },

    /// Inspect consumer offsets
    Offset {
        #[command(subcommand)]
        command: OffsetCommands,
    },
}

#[derive(Subcommand, Debug)]
enum OffsetCommands {
    /// List every consumer and its newest committed offset
    List,

    /// Show the committed offset of every namespace for one consumer
    Show {
        /// The consumer (sink) name
        sink: String,
    },

    /// Remove a consumer's offsets
    Delete {
        /// The consumer (sink) name
        sink: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Offset { command } => run_offset(&args.log_dir, &command),
        command => run_log(&args.log_dir, command),
    }
}

fn run_log(log_dir: &Path, command: Commands) -> Result<()> {
    let config = Config::builder().log_dir(log_dir).build();
    let log = CommitLog::with_config(&config)?;

    match command {
        Commands::Oldest => println!("{}", log.oldest_offset()),
        Commands::Current => match log.newest_offset().checked_sub(1) {
            Some(current) => println!("{}", current),
            None => println!("-1"),
        },
        Commands::Show { offset } => {
            let start = i64::try_from(offset).map_err(|_| XlogError::OffsetNotFound(offset))?;
            let mut reader = log.new_reader(start)?;
            let Some((offset, entry)) = reader.next_entry()? else {
                return Err(XlogError::OffsetNotFound(offset));
            };
            println!("{:<10}: {}", "offset", offset);
            println!("{:<10}: {}", "timestamp", entry.timestamp);
            println!("{:<10}: {}", "mode", entry.mode);
            println!("{:<10}: {}", "op", entry.op.to_string().to_uppercase());
            println!("{:<10}: {}", "key", String::from_utf8_lossy(&entry.key));
            println!("{:<10}: {}", "value", String::from_utf8_lossy(&entry.value));
        }
        Commands::Segments => {
            println!("{:<24} {:>20} {:>20} {:>12}", "file", "base_offset", "next_offset", "bytes");
            for segment in log.segments() {
                let path = segment.path();
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                println!(
                    "{:<24} {:>20} {:>20} {:>12}",
                    name,
                    segment.base_offset(),
                    segment.next_offset(),
                    segment.position()
                );
            }
        }
        Commands::Compact { safe_offset } => {
            let report = match safe_offset {
                Some(safe_offset) => {
                    let segments = log.segments();
                    let rotated = &segments[..segments.len() - 1];
                    NamespaceCompactor::new(&log).compact(safe_offset, rotated)
                }
                // Bounded by what every sink in this directory has committed
                None => compact_once(&log, &open_consumers(log_dir)?),
            };
            for stats in &report.compacted {
                println!(
                    "compacted {:020}: {} -> {} entries, {} bytes saved",
                    stats.base_offset,
                    stats.entries_before,
                    stats.entries_after,
                    stats.bytes_saved()
                );
            }
            for (base_offset, reason) in &report.skipped {
                println!("skipped   {:020}: {:?}", base_offset, reason);
            }
            for (base_offset, e) in &report.failed {
                println!("failed    {:020}: {}", base_offset, e);
            }
        }
        Commands::Offset { command } => return run_offset(log_dir, &command),
    }

    log.close()
}

fn open_consumers(log_dir: &Path) -> Result<Vec<Arc<dyn OffsetManager>>> {
    Ok(LogOffsetManager::open_all(log_dir)?
        .into_iter()
        .map(|manager| Arc::new(manager) as Arc<dyn OffsetManager>)
        .collect())
}

fn run_offset(log_dir: &Path, command: &OffsetCommands) -> Result<()> {
    match command {
        OffsetCommands::List => {
            println!("{:<32} {:>20}", "sink", "offset");
            for name in LogOffsetManager::consumers(log_dir)? {
                let manager = LogOffsetManager::open(log_dir, &name)?;
                let newest = manager
                    .newest_offset()
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-1".to_string());
                println!("{:<32} {:>20}", name, newest);
            }
        }
        OffsetCommands::Show { sink } => {
            let manager = LogOffsetManager::open(log_dir, sink)?;
            let mut offsets: Vec<_> = manager.offset_map().into_iter().collect();
            offsets.sort();
            println!("{:<32} {:>20}", "namespace", "offset");
            for (namespace, offset) in offsets {
                println!("{:<32} {:>20}", namespace, offset);
            }
        }
        OffsetCommands::Delete { sink } => {
            LogOffsetManager::delete(log_dir, sink)?;
            println!("OK");
        }
    }
    Ok(())
}
