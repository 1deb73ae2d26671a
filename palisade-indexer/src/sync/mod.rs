//! Historical sync: progress tracking, the task queue, and the per-chain
//! scheduler.

pub mod historical;
pub mod progress;
pub mod queue;

pub use historical::{HistoricalSyncService, SyncEvent, SyncTask};
pub use progress::{BlockProgressTracker, CheckpointAdvance, ProgressTracker};
pub use queue::{ErrorDisposition, TaskQueue};
