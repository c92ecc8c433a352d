//! Drops NTFS metadata entries and user-configured noise paths

use crate::config::IgnoreSet;

pub struct IgnoreFilter<'a> {
    ignore: &'a IgnoreSet,
}

impl<'a> IgnoreFilter<'a> {
    pub fn new(ignore: &'a IgnoreSet) -> Self {
        Self { ignore }
    }

    /// True when `path` should not be persisted
    pub fn is_ignored(&self, path: &str) -> bool {
        // $MFT, $Extend\$UsnJrnl, ... and anything under them
        if path.contains('$') {
            return true;
        }
        if self.ignore.is_empty() {
            return false;
        }
        let lower = path.to_lowercase();
        self.ignore.iter().any(|needle| lower.contains(needle))
    }
}
