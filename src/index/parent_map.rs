//! FRN → (name, parent) forest and the path walk over it

use crate::error::{IndexError, Result};
use std::collections::HashMap;

/// Deepest chain an NTFS path can hold: 32 767 UTF-16 units, at least two
/// per level (`\` plus one character)
pub const MAX_CHAIN_DEPTH: usize = 16_384;

/// Path separator used in persisted paths
pub const SEPARATOR: char = '\\';

/// One named link of the namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrnEntry {
    pub filename: String,
    pub parent_frn: u64,
}

/// Mutable map from segment number to its name and parent.
///
/// Built by one volume pass and discarded after; a later insert for the same
/// segment replaces the earlier one.
#[derive(Debug, Default)]
pub struct ParentMap {
    entries: HashMap<u64, FrnEntry>,
}

impl ParentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, frn: u64, filename: String, parent_frn: u64) {
        self.entries.insert(
            frn,
            FrnEntry {
                filename,
                parent_frn,
            },
        );
    }

    pub fn get(&self, frn: u64) -> Option<&FrnEntry> {
        self.entries.get(&frn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &FrnEntry)> + '_ {
        self.entries.iter().map(|(frn, entry)| (*frn, entry))
    }
}

// ============================================================================
// Path Resolver
// ============================================================================

/// Builds `X:\a\b\c` paths by walking parent links until a segment is
/// missing from the map (the volume root and system records never are in it).
pub struct PathResolver<'a> {
    drive_letter: char,
    map: &'a ParentMap,
    max_depth: usize,
}

impl<'a> PathResolver<'a> {
    pub fn new(drive_letter: char, map: &'a ParentMap) -> Self {
        Self {
            drive_letter,
            map,
            max_depth: MAX_CHAIN_DEPTH,
        }
    }

    /// Lower the chain bound (tests, or callers with a tighter budget)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Absolute path of `frn`, or `IndexCorruption` when the chain is longer
    /// than the bound (a parent cycle)
    pub fn resolve(&self, frn: u64) -> Result<String> {
        let mut components: Vec<&str> = Vec::new();
        let mut current = frn;

        while let Some(entry) = self.map.get(current) {
            if components.len() == self.max_depth {
                return Err(IndexError::IndexCorruption {
                    frn,
                    limit: self.max_depth,
                });
            }
            components.push(&entry.filename);
            current = entry.parent_frn;
        }

        let capacity = 2 + components.iter().map(|c| c.len() + 1).sum::<usize>();
        let mut path = String::with_capacity(capacity);
        path.push(self.drive_letter);
        path.push(':');
        for component in components.iter().rev() {
            path.push(SEPARATOR);
            path.push_str(component);
        }
        Ok(path)
    }
}
