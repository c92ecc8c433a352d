//! Shard placement and priority of resolved paths

use crate::config::PriorityMap;
use crate::index::parent_map::SEPARATOR;

/// Fixed number of shard tables (`list0` .. `list40`)
pub const SHARD_COUNT: usize = 41;

/// Unit written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPath {
    pub full_path: String,
    pub ascii_sum: u32,
    pub shard_id: usize,
    pub priority: i32,
}

/// Sum of the name's bytes read as signed values, counting only positive
/// ones: multi-byte UTF-8 sequences contribute nothing.
pub fn ascii_sum(name: &str) -> u32 {
    name.bytes()
        .map(|b| b as i8)
        .filter(|&b| b > 0)
        .map(|b| b as u32)
        .sum()
}

/// `min(ascii_sum / 100, 40)`
pub fn shard_id(ascii_sum: u32) -> usize {
    ((ascii_sum / 100) as usize).min(SHARD_COUNT - 1)
}

/// Assigns shard and priority using a shared, read-only priority table
pub struct Classifier<'a> {
    priorities: &'a PriorityMap,
}

impl<'a> Classifier<'a> {
    pub fn new(priorities: &'a PriorityMap) -> Self {
        Self { priorities }
    }

    pub fn classify(&self, filename: &str, full_path: String) -> IndexedPath {
        let ascii_sum = ascii_sum(filename);
        let priority = self.priority(&full_path);
        IndexedPath {
            full_path,
            ascii_sum,
            shard_id: shard_id(ascii_sum),
            priority,
        }
    }

    /// Priority of the text after the last `.` (the whole path when there is
    /// none). A miss whose suffix still holds a separator is a directory-like
    /// name and gets `dirPriority`; anything else gets `defaultPriority`.
    pub fn priority(&self, path: &str) -> i32 {
        let suffix = match path.rfind('.') {
            Some(dot) => &path[dot + 1..],
            None => path,
        };
        let suffix = suffix.to_ascii_lowercase();

        match self.priorities.get(&suffix) {
            Some(priority) => priority,
            None if suffix.contains(SEPARATOR) => self.priorities.dir_priority(),
            None => self.priorities.default_priority(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn priorities() -> PriorityMap {
        let map: HashMap<String, i32> = [("txt", 5), ("dirPriority", 1), ("defaultPriority", 0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        PriorityMap::new(map).unwrap()
    }

    #[test]
    fn ascii_sum_skips_high_bytes() {
        assert_eq!(ascii_sum("ab"), 97 + 98);
        assert_eq!(ascii_sum(""), 0);
        // 'é' is two bytes >= 0x80
        assert_eq!(ascii_sum("é"), 0);
        assert_eq!(ascii_sum("aé"), 97);
    }

    #[test]
    fn shard_is_quantized_and_clamped() {
        assert_eq!(shard_id(0), 0);
        assert_eq!(shard_id(99), 0);
        assert_eq!(shard_id(100), 1);
        assert_eq!(shard_id(4099), 40);
        assert_eq!(shard_id(123_456), 40);
    }

    #[test]
    fn priority_by_suffix() {
        let priorities = priorities();
        let classifier = Classifier::new(&priorities);
        assert_eq!(classifier.priority("C:\\a.TXT"), 5);
        assert_eq!(classifier.priority("C:\\Users\\docs"), 1);
        assert_eq!(classifier.priority("C:\\x.xyz"), 0);
        // the dot belongs to a directory, the suffix keeps a separator
        assert_eq!(classifier.priority("C:\\v1.2\\readme"), 1);
    }

    #[test]
    fn classify_uses_filename_for_shard() {
        let priorities = priorities();
        let classifier = Classifier::new(&priorities);
        let name = "z".repeat(20); // 20 * 122 = 2440
        let indexed = classifier.classify(&name, format!("C:\\dir\\{}", name));
        assert_eq!(indexed.ascii_sum, 2440);
        assert_eq!(indexed.shard_id, 24);
        assert_eq!(indexed.priority, 1);
    }
}
