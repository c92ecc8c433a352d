//! Indexer configuration
//!
//! The priority table and the ignore list are built once and then shared
//! read-only by every volume worker.

use crate::error::{IndexError, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Key consulted for directory-like paths without a known suffix
pub const DIR_PRIORITY_KEY: &str = "dirPriority";
/// Key consulted for everything else without a known suffix
pub const DEFAULT_PRIORITY_KEY: &str = "defaultPriority";

/// Rows inserted between two commits
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100_000;

// ============================================================================
// Priority Map
// ============================================================================

/// Lowercase suffix → priority, always holding both fallback keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityMap {
    map: HashMap<String, i32>,
    dir_priority: i32,
    default_priority: i32,
}

impl PriorityMap {
    /// Validate and build; fails when a fallback key is missing
    pub fn new(map: HashMap<String, i32>) -> Result<Self> {
        let dir_priority = *map
            .get(DIR_PRIORITY_KEY)
            .ok_or(IndexError::MissingPriorityKey(DIR_PRIORITY_KEY))?;
        let default_priority = *map
            .get(DEFAULT_PRIORITY_KEY)
            .ok_or(IndexError::MissingPriorityKey(DEFAULT_PRIORITY_KEY))?;

        Ok(Self {
            map,
            dir_priority,
            default_priority,
        })
    }

    /// The table a fresh installation starts with
    pub fn builtin() -> Self {
        let suffixes = [
            "lnk", "exe", "bat", "cmd", "txt", "docx", "zip", "rar", "7z", "html",
        ];
        let mut map: HashMap<String, i32> = suffixes
            .iter()
            .zip((1..=10).rev())
            .map(|(suffix, priority)| (suffix.to_string(), priority))
            .collect();
        map.insert(DEFAULT_PRIORITY_KEY.to_string(), 0);
        map.insert(DIR_PRIORITY_KEY.to_string(), -1);

        Self {
            map,
            dir_priority: -1,
            default_priority: 0,
        }
    }

    /// Read `priority(SUFFIX, PRIORITY)`; `dirPriority` defaults to -1 when
    /// the table does not carry it
    pub fn load_from_db(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT SUFFIX, PRIORITY FROM priority;")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?)))?;

        let mut map = HashMap::new();
        for row in rows {
            let (suffix, priority) = row?;
            map.insert(suffix, priority);
        }
        map.entry(DIR_PRIORITY_KEY.to_string()).or_insert(-1);

        Self::new(map)
    }

    /// Exact lookup of a lowercase suffix or fallback key
    pub fn get(&self, suffix: &str) -> Option<i32> {
        self.map.get(suffix).copied()
    }

    pub fn dir_priority(&self) -> i32 {
        self.dir_priority
    }

    pub fn default_priority(&self) -> i32 {
        self.default_priority
    }

    /// Every entry, fallback keys included
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.map.iter().map(|(suffix, &priority)| (suffix.as_str(), priority))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Serialize for PriorityMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PriorityMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = HashMap::<String, i32>::deserialize(deserializer)?;
        PriorityMap::new(map).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Ignore Set
// ============================================================================

/// Lowercase substrings; a path containing any of them is not indexed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IgnoreSet {
    entries: Vec<String>,
}

impl IgnoreSet {
    /// Trim, lowercase and drop empty entries (an empty needle would match
    /// every path)
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Comma-separated list, as the host application stores it
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<String>> for IgnoreSet {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl From<IgnoreSet> for Vec<String> {
    fn from(set: IgnoreSet) -> Self {
        set.entries
    }
}

// ============================================================================
// Index Configuration
// ============================================================================

/// Run configuration, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// Drive letters to index
    pub drives: Vec<char>,
    /// Directory holding one `<letter>.db` per drive
    pub database_dir: PathBuf,
    /// Substrings excluded from the index
    pub ignore_paths: IgnoreSet,
    /// Inline priority table; wins over `priority_db`
    pub priorities: Option<PriorityMap>,
    /// SQLite database holding a `priority` table
    pub priority_db: Option<PathBuf>,
    /// Rows inserted between two commits
    pub checkpoint_interval: usize,
    /// One worker per volume when true
    pub parallel: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            drives: vec!['C'],
            database_dir: PathBuf::from("data"),
            ignore_paths: IgnoreSet::default(),
            priorities: None,
            priority_db: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            parallel: true,
        }
    }
}

impl IndexConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: IndexConfig = serde_json::from_str(&text)?;
        config.normalize()?;
        Ok(config)
    }

    /// Load the three-line search-info file written by the host:
    /// drives (`C:\,D:\`), database directory, comma-separated ignore list
    pub fn from_search_info(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_search_info(&text)
    }

    pub fn parse_search_info(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let drives_line = lines
            .next()
            .ok_or_else(|| IndexError::Config("search info is empty".to_string()))?;
        let database_dir = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| IndexError::Config("search info has no database directory".to_string()))?;
        let ignore_line = lines.next().unwrap_or("");

        let drives = drives_line
            .split(',')
            .filter_map(|d| d.trim().chars().next())
            .collect();

        let mut config = Self {
            drives,
            database_dir: PathBuf::from(database_dir),
            ignore_paths: IgnoreSet::parse_list(ignore_line),
            ..Self::default()
        };
        config.normalize()?;
        Ok(config)
    }

    /// Uppercase and deduplicate drive letters, reject non-letters
    pub fn normalize(&mut self) -> Result<()> {
        let mut drives = Vec::with_capacity(self.drives.len());
        for drive in &self.drives {
            if !drive.is_ascii_alphabetic() {
                return Err(IndexError::Config(format!("'{}' is not a drive letter", drive)));
            }
            let drive = drive.to_ascii_uppercase();
            if !drives.contains(&drive) {
                drives.push(drive);
            }
        }
        self.drives = drives;

        if self.checkpoint_interval == 0 {
            return Err(IndexError::Config("checkpointInterval must be positive".to_string()));
        }
        Ok(())
    }

    /// Inline table, else the priority database, else the builtin table
    pub fn resolve_priorities(&self) -> Result<PriorityMap> {
        if let Some(priorities) = &self.priorities {
            return Ok(priorities.clone());
        }
        if let Some(path) = &self.priority_db {
            let conn = Connection::open(path)?;
            return PriorityMap::load_from_db(&conn);
        }
        Ok(PriorityMap::builtin())
    }
}
