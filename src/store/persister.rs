//! Batched, checkpointed shard writer
//!
//! All inserts of one volume run inside explicit transactions. Every
//! `checkpoint_interval` rows the statements are finalized, the transaction
//! is committed and a new one begins, so a failure late in the drain loses
//! only the rows since the last checkpoint.

use crate::error::{IndexError, Result};
use crate::index::{IndexedPath, SHARD_COUNT};
use crate::store::table_name;
use rusqlite::{params, Connection, Statement};
use tracing::{debug, warn};

/// Counters for one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Rows handed to `insert`
    pub attempted: u64,
    /// Rows that were new to the store
    pub inserted: u64,
    /// Commits made before `finish`
    pub checkpoints: u64,
    /// Rows dropped because their shard has no statement
    pub skipped_disabled: u64,
}

pub struct ShardedPersister<'conn> {
    conn: &'conn Connection,
    drive_letter: char,
    /// One statement per shard; `None` once a shard failed to prepare
    statements: Vec<Option<Statement<'conn>>>,
    disabled: [bool; SHARD_COUNT],
    checkpoint_interval: usize,
    since_checkpoint: usize,
    in_transaction: bool,
    stats: PersistStats,
}

impl<'conn> ShardedPersister<'conn> {
    /// Open a transaction and prepare one insert per shard
    pub fn begin(conn: &'conn Connection, drive_letter: char, checkpoint_interval: usize) -> Result<Self> {
        let mut persister = Self {
            conn,
            drive_letter,
            statements: Vec::with_capacity(SHARD_COUNT),
            disabled: [false; SHARD_COUNT],
            checkpoint_interval: checkpoint_interval.max(1),
            since_checkpoint: 0,
            in_transaction: false,
            stats: PersistStats::default(),
        };

        conn.execute_batch("BEGIN;")?;
        persister.in_transaction = true;
        persister.prepare_all();
        Ok(persister)
    }

    fn prepare_all(&mut self) {
        let conn = self.conn;
        self.statements.clear();

        for shard in 0..SHARD_COUNT {
            if self.disabled[shard] {
                self.statements.push(None);
                continue;
            }

            let sql = format!("INSERT OR IGNORE INTO {} VALUES(?1, ?2, ?3);", table_name(shard));
            match conn.prepare(&sql) {
                Ok(stmt) => self.statements.push(Some(stmt)),
                Err(source) => {
                    let err = IndexError::StatementPrepare { shard, source };
                    warn!(drive = %self.drive_letter, "{}; shard disabled for this run", err);
                    self.disabled[shard] = true;
                    self.statements.push(None);
                }
            }
        }
    }

    /// Write one row into its shard
    pub fn insert(&mut self, path: &IndexedPath) -> Result<()> {
        self.stats.attempted += 1;

        match self.statements.get_mut(path.shard_id).and_then(Option::as_mut) {
            Some(stmt) => {
                let changed = stmt.execute(params![path.ascii_sum, path.full_path, path.priority])?;
                self.stats.inserted += changed as u64;
            }
            None => self.stats.skipped_disabled += 1,
        }

        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.checkpoint_interval {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Finalize statements, commit, begin again and re-prepare
    pub fn checkpoint(&mut self) -> Result<()> {
        self.statements.clear();
        self.conn.execute_batch("COMMIT;")?;
        self.in_transaction = false;
        self.stats.checkpoints += 1;
        self.since_checkpoint = 0;

        debug!(
            drive = %self.drive_letter,
            rows = self.stats.attempted,
            "checkpoint committed"
        );

        self.conn.execute_batch("BEGIN;")?;
        self.in_transaction = true;
        self.prepare_all();
        Ok(())
    }

    /// Shards that lost their statement
    pub fn disabled_shards(&self) -> Vec<usize> {
        (0..SHARD_COUNT).filter(|&s| self.disabled[s]).collect()
    }

    pub fn stats(&self) -> PersistStats {
        self.stats
    }

    /// Commit the tail and hand back the counters
    pub fn finish(mut self) -> Result<PersistStats> {
        self.statements.clear();
        self.conn.execute_batch("COMMIT;")?;
        self.in_transaction = false;
        Ok(self.stats)
    }
}

impl Drop for ShardedPersister<'_> {
    fn drop(&mut self) {
        self.statements.clear();
        if self.in_transaction {
            warn!(
                drive = %self.drive_letter,
                "drain interrupted, rolling back rows since the last checkpoint"
            );
            if let Err(e) = self.conn.execute_batch("ROLLBACK;") {
                warn!(drive = %self.drive_letter, "rollback failed: {}", e);
            }
        }
    }
}
