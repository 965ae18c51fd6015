//! Real-time snapshot management and the background refresh task.

pub mod refresh;
pub mod snapshot;

pub use refresh::{FeedSource, RefreshConfig, RefreshTask};
pub use snapshot::RealtimeSnapshotStore;
