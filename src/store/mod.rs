//! SQLite path store
//!
//! One database file per drive, holding 41 shard tables `list0` .. `list40`.
//! Rows are `(ASCII, PATH, PRIORITY)` with a composite primary key, so
//! re-indexing a volume never duplicates a row.

pub mod persister;

pub use persister::{PersistStats, ShardedPersister};

use crate::config::PriorityMap;
use crate::error::Result;
use crate::index::SHARD_COUNT;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shard table name
pub fn table_name(shard: usize) -> String {
    format!("list{}", shard)
}

/// `<dir>\<LETTER>.db`
pub fn database_path(dir: &Path, drive_letter: char) -> PathBuf {
    dir.join(format!("{}.db", drive_letter.to_ascii_uppercase()))
}

/// Open (creating if needed) a database file and its parent directory
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Create the shard tables when missing
pub fn init_tables(conn: &Connection) -> Result<()> {
    let mut ddl = String::from("BEGIN;");
    for shard in 0..SHARD_COUNT {
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {}(ASCII INT, PATH TEXT, PRIORITY INT, PRIMARY KEY(\"ASCII\",\"PATH\",\"PRIORITY\"));",
            table_name(shard)
        ));
    }
    ddl.push_str("COMMIT;");
    conn.execute_batch(&ddl)?;
    Ok(())
}

/// Create the `priority` table and fill it from `priorities`
pub fn write_priorities(conn: &Connection, priorities: &PriorityMap) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS priority(SUFFIX TEXT UNIQUE, PRIORITY INT);")?;
    let mut stmt = conn.prepare("INSERT OR REPLACE INTO priority VALUES(?1, ?2);")?;
    for (suffix, priority) in priorities.iter() {
        stmt.execute(params![suffix, priority])?;
    }
    Ok(())
}

/// Row count of every shard, indexed by shard id
pub fn row_counts(conn: &Connection) -> Result<Vec<u64>> {
    (0..SHARD_COUNT)
        .map(|shard| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {};", table_name(shard)),
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .collect()
}

/// Empty every shard before a full re-index
pub fn clear_tables(conn: &Connection) -> Result<()> {
    let mut sql = String::from("BEGIN;");
    for shard in 0..SHARD_COUNT {
        sql.push_str(&format!("DELETE FROM {};", table_name(shard)));
    }
    sql.push_str("COMMIT;");
    conn.execute_batch(&sql)?;
    Ok(())
}

pub fn vacuum(conn: &Connection) -> Result<()> {
    conn.execute_batch("VACUUM;")?;
    Ok(())
}
