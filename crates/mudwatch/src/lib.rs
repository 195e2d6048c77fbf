//! mudwatch
//!
//! Live reload of world content. The content root is snapshotted as a hash
//! tree; each re-scan diffs against the previous snapshot and turns the
//! difference into `mudsim::WorldPatch`es for the engine to apply.

pub mod content;
pub mod fstree;
pub mod watcher;

pub use watcher::{ContentWatcher, Scan, WatchConfig};
