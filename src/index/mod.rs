//! From ParentMap entries to classified, filtered rows

pub mod classify;
pub mod ignore;
pub mod parent_map;

pub use classify::{ascii_sum, shard_id, Classifier, IndexedPath, SHARD_COUNT};
pub use ignore::IgnoreFilter;
pub use parent_map::{FrnEntry, ParentMap, PathResolver, MAX_CHAIN_DEPTH};
