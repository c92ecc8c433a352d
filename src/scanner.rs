//! Volume Indexer
//!
//! Drives one volume through `Opening → QueryingGeometry → Scanning →
//! Finalizing → Done`, or `Failed` from any of them:
//!
//! 1. open the device and read its geometry
//! 2. walk the MFT into a ParentMap (no lock held)
//! 3. resolve, filter, classify and persist every entry while holding the
//!    store lock
//!
//! Every outcome, including a panic inside the worker, comes back as a
//! [`VolumeReport`].

use crate::config::{IgnoreSet, PriorityMap, DEFAULT_CHECKPOINT_INTERVAL};
use crate::error::{IndexError, Result};
use crate::index::{Classifier, IgnoreFilter, ParentMap, PathResolver};
use crate::logging;
use crate::ntfs::{AttributeParser, DeviceOpener, MftDevice, MftRecordReader, VolumeSession};
use crate::store::{PersistStats, ShardedPersister};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use rayon::prelude::*;
use rusqlite::Connection;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Progress is redrawn every this many records
const PROGRESS_STEP: u64 = 4096;

/// Upper bound for the initial ParentMap allocation
const MAX_PREALLOCATED_ENTRIES: u64 = 1 << 22;

// ============================================================================
// Scanner Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Rows inserted between two commits
    pub checkpoint_interval: usize,
    /// Show progress bars while scanning
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            show_progress: true,
        }
    }
}

// ============================================================================
// Volume State & Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Opening,
    QueryingGeometry,
    Scanning,
    Finalizing,
    Done,
    Failed,
}

impl VolumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Opening => "Opening",
            VolumeState::QueryingGeometry => "Querying Geometry",
            VolumeState::Scanning => "Scanning",
            VolumeState::Finalizing => "Finalizing",
            VolumeState::Done => "Done",
            VolumeState::Failed => "Failed",
        }
    }
}

/// Outcome of indexing one volume
#[derive(Debug, Clone)]
pub struct VolumeReport {
    pub drive_letter: char,
    pub state: VolumeState,
    /// State the volume was in when it failed
    pub failed_in: Option<VolumeState>,
    pub records_read: u64,
    /// Distinct FRNs with a Win32 name; extra hard-link names count once
    pub names_collected: u64,
    /// Records skipped for a malformed attribute chain
    pub malformed: u64,
    /// Entries skipped for an overlong parent chain
    pub corrupt_chains: u64,
    /// Paths dropped by the ignore filter
    pub ignored: u64,
    pub rows_attempted: u64,
    pub rows_inserted: u64,
    pub checkpoints: u64,
    pub disabled_shards: Vec<usize>,
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

impl VolumeReport {
    fn new(drive_letter: char) -> Self {
        Self {
            drive_letter,
            state: VolumeState::Opening,
            failed_in: None,
            records_read: 0,
            names_collected: 0,
            malformed: 0,
            corrupt_chains: 0,
            ignored: 0,
            rows_attempted: 0,
            rows_inserted: 0,
            checkpoints: 0,
            disabled_shards: Vec::new(),
            elapsed_secs: 0.0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == VolumeState::Done
    }

    fn transition(&mut self, state: VolumeState) {
        debug!(drive = %self.drive_letter, from = self.state.as_str(), to = state.as_str(), "volume state");
        self.state = state;
    }

    fn record_persist(&mut self, stats: PersistStats) {
        self.rows_attempted = stats.attempted;
        self.rows_inserted = stats.inserted;
        self.checkpoints = stats.checkpoints;
    }

    fn fail(&mut self, err: &IndexError) {
        self.failed_in = Some(self.state);
        self.state = VolumeState::Failed;
        self.error = Some(err.to_string());
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Volume Indexer
// ============================================================================

/// Indexes single volumes against shared, read-only tables
pub struct VolumeIndexer<'a> {
    priorities: &'a PriorityMap,
    ignore: &'a IgnoreSet,
    config: ScanConfig,
}

impl<'a> VolumeIndexer<'a> {
    pub fn new(priorities: &'a PriorityMap, ignore: &'a IgnoreSet) -> Self {
        Self {
            priorities,
            ignore,
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Index one volume into `store`. Never returns an error and never
    /// unwinds: failures and panics end in a `Failed` report.
    pub fn index_volume<O: DeviceOpener>(
        &self,
        opener: &O,
        drive_letter: char,
        store: &Mutex<Connection>,
        pb: Option<&ProgressBar>,
    ) -> VolumeReport {
        let start = Instant::now();
        let mut report = VolumeReport::new(drive_letter);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(opener, drive_letter, store, pb, &mut report)
        }));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(IndexError::Panicked(panic_message(payload))),
        };

        report.elapsed_secs = start.elapsed().as_secs_f64();

        match failure {
            None => {
                report.transition(VolumeState::Done);
                info!(
                    drive = %drive_letter,
                    rows = report.rows_attempted,
                    inserted = report.rows_inserted,
                    elapsed_secs = report.elapsed_secs,
                    "collect disk {} complete",
                    drive_letter
                );
                if let Some(pb) = pb {
                    pb.finish_with_message(format!(
                        "{}: done, {} rows ({:.2}s)",
                        drive_letter, report.rows_attempted, report.elapsed_secs
                    ));
                }
            }
            Some(err) => {
                report.fail(&err);
                let failed_in = report.failed_in.unwrap_or(VolumeState::Opening);
                error!(drive = %drive_letter, state = failed_in.as_str(), "{}", err);
                if let Some(pb) = pb {
                    pb.abandon_with_message(format!("{}: failed ({})", drive_letter, err));
                }
            }
        }

        report
    }

    fn run<O: DeviceOpener>(
        &self,
        opener: &O,
        drive_letter: char,
        store: &Mutex<Connection>,
        pb: Option<&ProgressBar>,
        report: &mut VolumeReport,
    ) -> Result<()> {
        logging::separator(&format!("INDEX START: Drive {}", drive_letter));

        if let Some(pb) = pb {
            pb.set_message(format!("{}: opening volume...", drive_letter));
        }
        let device = opener.open(drive_letter)?;

        report.transition(VolumeState::QueryingGeometry);
        let mut session = VolumeSession::establish(drive_letter, device)?;

        report.transition(VolumeState::Scanning);
        let map = Self::collect(&mut session, report, pb)?;
        // release the handle before waiting on the store
        drop(session);

        report.transition(VolumeState::Finalizing);
        if let Some(pb) = pb {
            pb.set_message(format!("{}: writing {} entries...", drive_letter, map.len()));
        }
        self.drain(drive_letter, &map, store, report)
    }

    /// Walk the MFT into a fresh ParentMap
    fn collect<D: MftDevice>(
        session: &mut VolumeSession<D>,
        report: &mut VolumeReport,
        pb: Option<&ProgressBar>,
    ) -> Result<ParentMap> {
        let drive_letter = session.drive_letter();
        let total = session.record_count();
        let mut map = ParentMap::with_capacity(total.min(MAX_PREALLOCATED_ENTRIES) as usize);

        if let Some(pb) = pb {
            pb.set_length(total);
            pb.set_message(format!("{}: reading MFT ({} segments)", drive_letter, total));
        }

        let mut reader = MftRecordReader::new(session);
        while let Some(record) = reader.next_record() {
            let record = record?;
            report.records_read += 1;

            match AttributeParser::parse_into(record.record_number, record.data, &mut map) {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    report.malformed += 1;
                    debug!(drive = %drive_letter, record = record.record_number, "skipping record: {}", e);
                }
                Err(e) => return Err(e),
            }

            if let Some(pb) = pb {
                if report.records_read % PROGRESS_STEP == 0 {
                    pb.set_position(total.saturating_sub(record.record_number));
                }
            }
        }

        report.names_collected = map.len() as u64;
        debug!(
            drive = %drive_letter,
            records = report.records_read,
            entries = map.len(),
            malformed = report.malformed,
            "MFT walk finished"
        );
        Ok(map)
    }

    /// Resolve, filter, classify and persist every entry under the store lock
    fn drain(
        &self,
        drive_letter: char,
        map: &ParentMap,
        store: &Mutex<Connection>,
        report: &mut VolumeReport,
    ) -> Result<()> {
        let conn = store.lock();
        let mut persister = ShardedPersister::begin(&conn, drive_letter, self.config.checkpoint_interval)?;
        report.disabled_shards = persister.disabled_shards();

        let result = self.drain_rows(drive_letter, map, &mut persister, report);
        report.record_persist(persister.stats());
        result?;

        let stats = persister.finish()?;
        report.record_persist(stats);
        Ok(())
    }

    fn drain_rows(
        &self,
        drive_letter: char,
        map: &ParentMap,
        persister: &mut ShardedPersister<'_>,
        report: &mut VolumeReport,
    ) -> Result<()> {
        let resolver = PathResolver::new(drive_letter, map);
        let classifier = Classifier::new(self.priorities);
        let filter = IgnoreFilter::new(self.ignore);

        for (frn, entry) in map.iter() {
            let full_path = match resolver.resolve(frn) {
                Ok(path) => path,
                Err(e) if e.is_recoverable() => {
                    report.corrupt_chains += 1;
                    warn!(drive = %drive_letter, frn, "{}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if filter.is_ignored(&full_path) {
                report.ignored += 1;
                continue;
            }

            let row = classifier.classify(&entry.filename, full_path);
            persister.insert(&row)?;
        }
        Ok(())
    }
}

// ============================================================================
// Multi-Volume Indexer
// ============================================================================

/// One volume and the store its rows go to
#[derive(Clone)]
pub struct VolumeTarget {
    pub drive_letter: char,
    pub store: Arc<Mutex<Connection>>,
}

/// Index several volumes, one rayon worker per volume
pub struct MultiVolumeIndexer<'a> {
    indexer: VolumeIndexer<'a>,
    parallel: bool,
}

impl<'a> MultiVolumeIndexer<'a> {
    pub fn new(indexer: VolumeIndexer<'a>) -> Self {
        Self {
            indexer,
            parallel: true,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reports come back in the order of `targets`
    pub fn index_all<O: DeviceOpener>(&self, opener: &O, targets: &[VolumeTarget]) -> Vec<VolumeReport> {
        let multi = self.indexer.config.show_progress.then(MultiProgress::new);
        let bars: Vec<Option<ProgressBar>> = targets
            .iter()
            .map(|target| {
                multi.as_ref().map(|multi| {
                    let pb = multi.add(ProgressBar::new(0));
                    pb.set_style(progress_style());
                    pb.set_prefix(format!("{}:", target.drive_letter));
                    pb
                })
            })
            .collect();

        let index_one = |(target, pb): (&VolumeTarget, &Option<ProgressBar>)| {
            self.indexer
                .index_volume(opener, target.drive_letter, &target.store, pb.as_ref())
        };

        if self.parallel {
            targets.par_iter().zip(bars.par_iter()).map(index_one).collect()
        } else {
            targets.iter().zip(bars.iter()).map(index_one).collect()
        }
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Drive letters whose volume opens and answers the NTFS geometry query
pub fn detect_ntfs_volumes<O: DeviceOpener>(opener: &O) -> Vec<char> {
    ('A'..='Z')
        .filter(|&letter| {
            opener
                .open(letter)
                .and_then(|device| VolumeSession::establish(letter, device))
                .is_ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::{FileRecord, NtfsVolumeData};
    use crate::store::init_tables;
    use tracing_test::traced_test;

    struct DeniedOpener;

    enum Never {}

    impl MftDevice for Never {
        fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
            match *self {}
        }

        fn read_file_record(&mut self, _record_number: u64) -> Result<FileRecord<'_>> {
            match *self {}
        }
    }

    impl DeviceOpener for DeniedOpener {
        type Device = Never;

        fn open(&self, drive_letter: char) -> Result<Never> {
            Err(IndexError::DeviceOpen {
                drive: drive_letter,
                code: 5,
            })
        }
    }

    /// Geometry works, the first read panics
    struct PanickingDevice;

    impl MftDevice for PanickingDevice {
        fn query_volume_data(&mut self) -> Result<NtfsVolumeData> {
            Ok(NtfsVolumeData {
                bytes_per_file_record_segment: 1024,
                mft_valid_data_length: 64 * 1024,
                ..Default::default()
            })
        }

        fn read_file_record(&mut self, _record_number: u64) -> Result<FileRecord<'_>> {
            panic!("driver went away");
        }
    }

    struct PanickingOpener;

    impl DeviceOpener for PanickingOpener {
        type Device = PanickingDevice;

        fn open(&self, _drive_letter: char) -> Result<PanickingDevice> {
            Ok(PanickingDevice)
        }
    }

    fn store() -> Mutex<Connection> {
        let conn = Connection::open_in_memory().unwrap();
        init_tables(&conn).unwrap();
        Mutex::new(conn)
    }

    #[test]
    #[traced_test]
    fn open_failure_is_logged_and_reported() {
        let priorities = PriorityMap::builtin();
        let ignore = IgnoreSet::default();
        let indexer = VolumeIndexer::new(&priorities, &ignore);

        let report = indexer.index_volume(&DeniedOpener, 'Q', &store(), None);

        assert_eq!(report.state, VolumeState::Failed);
        assert_eq!(report.failed_in, Some(VolumeState::Opening));
        assert_eq!(report.records_read, 0);
        assert!(logs_contain("Failed to open volume 'Q:'"));
        assert!(!logs_contain("collect disk Q complete"));
    }

    #[test]
    fn panic_in_worker_becomes_failed_report() {
        let priorities = PriorityMap::builtin();
        let ignore = IgnoreSet::default();
        let indexer = VolumeIndexer::new(&priorities, &ignore);

        let report = indexer.index_volume(&PanickingOpener, 'P', &store(), None);

        assert_eq!(report.state, VolumeState::Failed);
        assert_eq!(report.failed_in, Some(VolumeState::Scanning));
        assert!(report.error.unwrap().contains("driver went away"));
    }

    #[test]
    fn detection_skips_unopenable_volumes() {
        assert!(detect_ntfs_volumes(&DeniedOpener).is_empty());
        assert_eq!(detect_ntfs_volumes(&PanickingOpener).len(), 26);
    }

    #[test]
    fn multi_volume_reports_keep_target_order() {
        let priorities = PriorityMap::builtin();
        let ignore = IgnoreSet::default();
        let config = ScanConfig {
            show_progress: false,
            ..ScanConfig::default()
        };
        let indexer = VolumeIndexer::new(&priorities, &ignore).with_config(config);
        let store = Arc::new(store());
        let targets: Vec<VolumeTarget> = ['C', 'D', 'E']
            .iter()
            .map(|&drive_letter| VolumeTarget {
                drive_letter,
                store: Arc::clone(&store),
            })
            .collect();

        let reports = MultiVolumeIndexer::new(indexer).index_all(&DeniedOpener, &targets);
        let drives: Vec<char> = reports.iter().map(|r| r.drive_letter).collect();
        assert_eq!(drives, vec!['C', 'D', 'E']);
        assert!(reports.iter().all(|r| r.state == VolumeState::Failed));
    }
}
