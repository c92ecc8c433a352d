//! mftindex CLI
//!
//! Command-line front end: index volumes into per-drive databases and
//! inspect the result.

use clap::{Parser, Subcommand};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::HumanDuration;
use mftindex::ntfs::{AttributeParser, MftRecordHeader, VolumeSession};
use mftindex::{
    detect_ntfs_volumes, logging, store, DeviceOpener, IgnoreSet, IndexConfig, MultiVolumeIndexer,
    ParentMap, ScanConfig, VolumeIndexer, VolumeOpener, VolumeReport, VolumeTarget, SHARD_COUNT,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// mftindex - NTFS full-volume path indexer
///
/// Walks the Master File Table of each volume and stores every path in
/// 41 checksum-sharded SQLite tables.
#[derive(Parser)]
#[command(name = "mftindex")]
#[command(author = "mftindex Contributors")]
#[command(version)]
#[command(about = "NTFS full-volume path indexer", long_about = None)]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more volumes
    Index {
        /// Drive letter to index (repeatable, e.g. -d C -d D)
        #[arg(short, long = "drive")]
        drives: Vec<char>,

        /// Directory holding one <LETTER>.db per drive
        #[arg(long)]
        db_dir: Option<PathBuf>,

        /// JSON configuration file
        #[arg(long, conflicts_with = "search_info")]
        config: Option<PathBuf>,

        /// Three-line search info file (drives, database dir, ignore list)
        #[arg(long)]
        search_info: Option<PathBuf>,

        /// Comma-separated substrings to leave out of the index
        #[arg(long)]
        ignore: Option<String>,

        /// SQLite database with a priority(SUFFIX, PRIORITY) table
        #[arg(long)]
        priority_db: Option<PathBuf>,

        /// Rows between two commits
        #[arg(long)]
        checkpoint: Option<usize>,

        /// Index volumes one after another
        #[arg(long)]
        sequential: bool,

        /// Empty the shard tables before indexing
        #[arg(long)]
        drop_previous: bool,

        /// Compact each database afterwards
        #[arg(long)]
        vacuum: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Create the shard tables (and optionally the priority table)
    InitDb {
        /// Drive letter (repeatable)
        #[arg(short, long = "drive", required = true)]
        drives: Vec<char>,

        /// Directory holding one <LETTER>.db per drive
        #[arg(long, default_value = "data")]
        db_dir: PathBuf,

        /// Also write the builtin priority table to this database
        #[arg(long)]
        priority_db: Option<PathBuf>,
    },

    /// Show per-shard row counts of a drive database
    Stats {
        /// Drive letter
        #[arg(short, long)]
        drive: char,

        /// Directory holding one <LETTER>.db per drive
        #[arg(long, default_value = "data")]
        db_dir: PathBuf,
    },

    /// List available NTFS volumes
    Volumes,

    /// Read a specific MFT record directly
    ReadMft {
        /// Drive letter
        #[arg(short, long)]
        drive: char,

        /// MFT record number to read
        record: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), e);
    }

    let result = match cli.command {
        Commands::Index {
            drives,
            db_dir,
            config,
            search_info,
            ignore,
            priority_db,
            checkpoint,
            sequential,
            drop_previous,
            vacuum,
            no_progress,
        } => load_config(
            config.as_deref(),
            search_info.as_deref(),
            Overrides {
                drives,
                db_dir,
                ignore,
                priority_db,
                checkpoint,
                sequential,
            },
        )
        .and_then(|config| cmd_index(&config, drop_previous, vacuum, !no_progress)),

        Commands::InitDb {
            drives,
            db_dir,
            priority_db,
        } => cmd_init_db(&drives, &db_dir, priority_db.as_deref()),

        Commands::Stats { drive, db_dir } => cmd_stats(drive, &db_dir),

        Commands::Volumes => cmd_volumes(),

        Commands::ReadMft { drive, record } => cmd_read_mft(drive, record),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Command-line values that win over the configuration file
struct Overrides {
    drives: Vec<char>,
    db_dir: Option<PathBuf>,
    ignore: Option<String>,
    priority_db: Option<PathBuf>,
    checkpoint: Option<usize>,
    sequential: bool,
}

fn load_config(
    config: Option<&Path>,
    search_info: Option<&Path>,
    overrides: Overrides,
) -> mftindex::Result<IndexConfig> {
    let mut config = match (config, search_info) {
        (Some(path), _) => IndexConfig::load(path)?,
        (None, Some(path)) => IndexConfig::from_search_info(path)?,
        (None, None) => IndexConfig::default(),
    };

    if !overrides.drives.is_empty() {
        config.drives = overrides.drives;
    }
    if let Some(db_dir) = overrides.db_dir {
        config.database_dir = db_dir;
    }
    if let Some(ignore) = overrides.ignore {
        config.ignore_paths = IgnoreSet::parse_list(&ignore);
    }
    if let Some(priority_db) = overrides.priority_db {
        config.priority_db = Some(priority_db);
    }
    if let Some(checkpoint) = overrides.checkpoint {
        config.checkpoint_interval = checkpoint;
    }
    if overrides.sequential {
        config.parallel = false;
    }

    config.normalize()?;
    Ok(config)
}

/// Index command implementation; `Ok(false)` when any volume failed
fn cmd_index(config: &IndexConfig, drop_previous: bool, vacuum: bool, show_progress: bool) -> mftindex::Result<bool> {
    let start = Instant::now();
    let priorities = config.resolve_priorities()?;

    println!(
        "{} Indexing {} into {}",
        style("→").cyan().bold(),
        style(
            config
                .drives
                .iter()
                .map(|d| format!("{}:", d))
                .collect::<Vec<_>>()
                .join(", ")
        )
        .yellow(),
        style(config.database_dir.display()).cyan()
    );

    let mut targets = Vec::with_capacity(config.drives.len());
    for &drive_letter in &config.drives {
        let conn = store::open_database(&store::database_path(&config.database_dir, drive_letter))?;
        store::init_tables(&conn)?;
        if drop_previous {
            store::clear_tables(&conn)?;
        }
        targets.push(VolumeTarget {
            drive_letter,
            store: Arc::new(Mutex::new(conn)),
        });
    }

    let indexer = VolumeIndexer::new(&priorities, &config.ignore_paths).with_config(ScanConfig {
        checkpoint_interval: config.checkpoint_interval,
        show_progress,
    });
    let reports = MultiVolumeIndexer::new(indexer)
        .parallel(config.parallel)
        .index_all(&VolumeOpener, &targets);

    if vacuum {
        for target in &targets {
            store::vacuum(&target.store.lock())?;
        }
    }

    println!();
    for report in &reports {
        print_report(report);
    }
    println!(
        "\n{} Finished in {}",
        style("✓").green().bold(),
        style(HumanDuration(start.elapsed())).cyan()
    );

    Ok(reports.iter().all(VolumeReport::is_success))
}

fn print_report(report: &VolumeReport) {
    if report.is_success() {
        println!(
            "  {} {}: {} rows ({} new) from {} records in {}",
            style("•").green(),
            report.drive_letter,
            style(report.rows_attempted).yellow(),
            report.rows_inserted,
            report.records_read,
            HumanDuration(Duration::from_secs_f64(report.elapsed_secs))
        );
    } else {
        println!(
            "  {} {}: {}",
            style("✗").red().bold(),
            report.drive_letter,
            style(report.error.as_deref().unwrap_or("failed")).red()
        );
    }

    if report.ignored > 0 || report.malformed > 0 || report.corrupt_chains > 0 {
        println!(
            "      {} ignored, {} malformed records, {} corrupt chains",
            report.ignored, report.malformed, report.corrupt_chains
        );
    }
    if !report.disabled_shards.is_empty() {
        println!(
            "      {} disabled shards: {:?}",
            style("!").yellow().bold(),
            report.disabled_shards
        );
    }
}

fn cmd_init_db(drives: &[char], db_dir: &Path, priority_db: Option<&Path>) -> mftindex::Result<bool> {
    for &drive in drives {
        let path = store::database_path(db_dir, drive);
        let conn = store::open_database(&path)?;
        store::init_tables(&conn)?;
        println!("  {} {}", style("✓").green(), path.display());
    }

    if let Some(path) = priority_db {
        let conn = store::open_database(path)?;
        store::write_priorities(&conn, &mftindex::PriorityMap::builtin())?;
        println!("  {} {} (priority table)", style("✓").green(), path.display());
    }

    Ok(true)
}

fn cmd_stats(drive: char, db_dir: &Path) -> mftindex::Result<bool> {
    let path = store::database_path(db_dir, drive);
    if !path.exists() {
        return Err(mftindex::IndexError::Config(format!("{} does not exist", path.display())));
    }

    let conn = store::open_database(&path)?;
    let counts = store::row_counts(&conn)?;
    let size = std::fs::metadata(&path)?.len();

    println!(
        "{} {} ({})",
        style("→").cyan().bold(),
        style(path.display()).cyan(),
        style(format_size(size, BINARY)).yellow()
    );
    for (shard, count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
        println!("  {:>7} {}", store::table_name(shard), count);
    }
    println!(
        "  {} {} rows in {} shards",
        style("Total:").bold(),
        style(counts.iter().sum::<u64>()).yellow(),
        SHARD_COUNT
    );

    Ok(true)
}

fn cmd_volumes() -> mftindex::Result<bool> {
    println!("{} Detecting NTFS volumes...", style("→").cyan().bold());
    println!();

    let volumes = detect_ntfs_volumes(&VolumeOpener);

    if volumes.is_empty() {
        println!("  No NTFS volumes found.");
        return Ok(true);
    }

    println!("Available NTFS volumes:");
    println!();
    for letter in volumes {
        print!("  {} {}:", style("•").green(), letter);

        match VolumeOpener
            .open(letter)
            .and_then(|device| VolumeSession::establish(letter, device))
        {
            Ok(session) => {
                let data = session.volume_data();
                let total = data.total_clusters * data.bytes_per_cluster as u64;
                let free = data.free_clusters * data.bytes_per_cluster as u64;
                println!(
                    " {} total, {} free, {} MFT segments",
                    style(format_size(total, BINARY)).yellow(),
                    style(format_size(free, BINARY)).green(),
                    session.record_count()
                );
            }
            Err(_) => println!(" (access denied)"),
        }
    }

    Ok(true)
}

fn cmd_read_mft(drive: char, record_num: u64) -> mftindex::Result<bool> {
    let drive = drive.to_ascii_uppercase();
    println!(
        "{} Reading MFT record {} from {}:",
        style("→").cyan().bold(),
        style(record_num).yellow(),
        drive
    );

    let device = VolumeOpener.open(drive)?;
    let mut session = VolumeSession::establish(drive, device)?;

    println!("  Volume data:");
    println!("    Bytes per MFT record: {}", session.bytes_per_record_segment());
    println!("    MFT valid length: {}", session.mft_valid_length());
    println!("    Record segments: {}", session.record_count());

    let record = session.read_record(record_num)?;
    println!("\n  Returned record {} ({} bytes)", record.record_number, record.data.len());
    if record.record_number != record_num {
        println!(
            "  {} requested segment is free, device answered with the nearest one below",
            style("!").yellow().bold()
        );
    }

    if let Some(header) = MftRecordHeader::from_bytes(record.data) {
        println!("    Signature valid: {}", header.is_valid());
        println!("    In use: {}", header.is_in_use());
        println!("    Directory: {}", header.is_directory());
        println!("    In $Extend: {}", header.is_in_extend());
        println!("    Sequence number: {}", header.sequence_number);
    }

    let mut map = ParentMap::new();
    match AttributeParser::parse_into(record.record_number, record.data, &mut map) {
        Ok(disposition) => {
            println!("    Disposition: {:?}", disposition);
            if let Some(entry) = map.get(record.record_number) {
                println!("    Name: '{}'", entry.filename);
                println!("    Parent Record: {}", entry.parent_frn);
            }
        }
        Err(e) => println!("  Failed to parse record: {}", e),
    }

    Ok(true)
}
