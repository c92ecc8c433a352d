//! mftindex - Full-volume NTFS path indexer
//!
//! Reads the Master File Table of NTFS volumes through raw device control
//! calls, rebuilds the absolute path of every live file and directory, and
//! stores the paths in 41 SQLite shard tables keyed by a filename checksum.
//!
//! # Features
//!
//! - **Direct MFT Reading**: top-down walk over `FSCTL_GET_NTFS_FILE_RECORD`
//! - **Win32 Names Only**: DOS 8.3 aliases never reach the index
//! - **Sharded Storage**: `list0` .. `list40`, one database file per drive
//! - **Priorities**: per-suffix ranking with directory and default fallbacks
//! - **Checkpointed Writes**: a failing volume keeps every committed batch
//! - **Parallel Volumes**: one rayon worker per drive
//!
//! # Example
//!
//! ```no_run
//! use mftindex::{store, IgnoreSet, PriorityMap, VolumeIndexer, VolumeOpener};
//! use parking_lot::Mutex;
//!
//! fn main() -> mftindex::Result<()> {
//!     let conn = store::open_database(&store::database_path("data".as_ref(), 'C'))?;
//!     store::init_tables(&conn)?;
//!     let conn = Mutex::new(conn);
//!
//!     let priorities = PriorityMap::builtin();
//!     let ignore = IgnoreSet::parse_list("C:\\Windows");
//!     let report = VolumeIndexer::new(&priorities, &ignore)
//!         .index_volume(&VolumeOpener, 'C', &conn, None);
//!
//!     println!("{}: {} rows", report.drive_letter, report.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod ntfs;
pub mod scanner;
pub mod store;

// Re-export main types
pub use config::{IgnoreSet, IndexConfig, PriorityMap};
pub use error::{IndexError, Result};
pub use index::{Classifier, IgnoreFilter, IndexedPath, ParentMap, PathResolver, SHARD_COUNT};
pub use scanner::{
    detect_ntfs_volumes, MultiVolumeIndexer, ScanConfig, VolumeIndexer, VolumeReport, VolumeState,
    VolumeTarget,
};
pub use store::{PersistStats, ShardedPersister};

// Re-export NTFS types that users might need
pub use ntfs::{DeviceOpener, FileRecord, MftDevice, NtfsVolumeData, VolumeOpener};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
