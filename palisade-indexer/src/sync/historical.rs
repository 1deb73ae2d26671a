//! Historical sync scheduler.
//!
//! One [`HistoricalSyncService`] runs per chain. At startup it loads the
//! intervals each source has already persisted, computes the remaining
//! work, and decomposes it into range tasks on the priority queue
//! (earliest blocks first). Range tasks fetch logs or traces, register
//! per-block persistence callbacks, and advance their source tracker.
//! Block tasks run only once every incomplete tracker's watermark has
//! passed their height; they fetch the block, drain its callbacks, and
//! feed the block progress tracker, which emits monotone checkpoints.
//!
//! # Task flow
//!
//! ```text
//! ┌────────────┐  required −   ┌───────────────┐  register   ┌──────────┐
//! │  Interval  │  cached       │  Range tasks  │  callbacks  │  Block   │
//! │  loading   │──────────────▶│ (log / trace /│────────────▶│  tasks   │
//! │            │               │  block kinds) │  watermark  │          │
//! └────────────┘               └───────────────┘  gate       └────┬─────┘
//!                                                                 │
//!                                                  monotone  ◀────┘
//!                                                  checkpoints
//! ```
//!
//! # Failure semantics
//!
//! Range-too-large and timeout errors split the request range in half and
//! retry recursively. Every other task failure logs a warning and
//! re-enqueues at the same priority; there is no poison pill. During
//! shutdown the error hook discards instead.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use alloy::primitives::B256;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use futures::stream::TryStreamExt;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::SyncSettings;
use crate::error::{AppError, Result, RpcError, SyncError};
use crate::metrics as metric_names;
use crate::ports::rpc::{LogQuery, RpcClient, TraceQuery};
use crate::ports::sync_store::{SyncStore, extract_child_address};
use crate::sync::progress::{BlockProgressTracker, ProgressTracker};
use crate::sync::queue::{ErrorDisposition, TaskQueue};
use crate::types::chain::{CallTraceFrame, ChainBlock, ChainLog};
use crate::types::interval::{Interval, IntervalSet};
use crate::types::source::{ChainId, Source, SourceId, Topics};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A new global checkpoint: all data at and below this block is
    /// durable. Strictly monotone per chain.
    Checkpoint {
        /// Chain the checkpoint belongs to.
        chain_id: ChainId,
        /// Checkpointed block number.
        block_number: u64,
        /// Timestamp of that block, Unix seconds.
        block_timestamp: u64,
    },
    /// Every source reached its target.
    SyncComplete {
        /// Chain that finished.
        chain_id: ChainId,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// TASKS
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of historical sync work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTask {
    /// Fetch logs for a plain log filter over `[from, to]`.
    LogFilter {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Discover factory child addresses over `[from, to]`.
    FactoryChild {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Fetch logs for discovered children over `[from, to]`.
    FactoryLogFilter {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Fetch call traces over `[from, to]`.
    Trace {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Fetch call traces for discovered children over `[from, to]`.
    FactoryTrace {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Resolve periodic blocks for a block filter over `[from, to]`.
    BlockInterval {
        /// Index into the configured source list.
        source_index: usize,
        /// First block (inclusive).
        from: u64,
        /// Last block (inclusive).
        to: u64,
    },
    /// Fetch one block and drain its registered callbacks.
    Block {
        /// Block height.
        number: u64,
    },
}

impl SyncTask {
    /// Queue priority: earliest block first.
    #[must_use]
    pub const fn priority(&self) -> u64 {
        let from = match self {
            Self::LogFilter { from, .. }
            | Self::FactoryChild { from, .. }
            | Self::FactoryLogFilter { from, .. }
            | Self::Trace { from, .. }
            | Self::FactoryTrace { from, .. }
            | Self::BlockInterval { from, .. } => *from,
            Self::Block { number } => *number,
        };
        u64::MAX - from
    }

    /// Short label for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LogFilter { .. } => "log_filter",
            Self::FactoryChild { .. } => "factory_child",
            Self::FactoryLogFilter { .. } => "factory_log_filter",
            Self::Trace { .. } => "trace_filter",
            Self::FactoryTrace { .. } => "factory_trace_filter",
            Self::BlockInterval { .. } => "block_interval",
            Self::Block { .. } => "block",
        }
    }
}

/// Per-block persistence callback, re-runnable across block retries.
type BlockCallback = Arc<dyn Fn(Arc<ChainBlock>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct SchedulerState {
    /// Main tracker per source, parallel to the source list.
    trackers: Vec<ProgressTracker>,
    /// Child-discovery tracker for factory sources.
    child_trackers: HashMap<usize, ProgressTracker>,
    /// Persistence callbacks keyed by block height.
    block_callbacks: BTreeMap<u64, Vec<BlockCallback>>,
    /// Global per-block completion ordering.
    block_progress: BlockProgressTracker,
    /// Highest watermark for which block tasks have been enqueued.
    block_tasks_enqueued: Option<u64>,
    /// Checkpoint held back by the debounce window.
    pending_checkpoint: Option<(u64, u64)>,
    /// Last undebounced checkpoint emission.
    last_checkpoint_emit: Option<Instant>,
    /// Finalized block at startup.
    finalized_block: u64,
    /// Blocks cached at startup, per source (for progress logging).
    initial_cached: Vec<u64>,
    /// When sync started (for ETA estimation).
    started_at: Option<Instant>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTORICAL SYNC SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-chain historical sync orchestrator.
///
/// # Type Parameters
///
/// * `S` - Sync store implementation
/// * `R` - RPC client implementation
pub struct HistoricalSyncService<S, R> {
    chain_id: ChainId,
    chain: String,
    sources: Vec<Source>,
    sync_store: Arc<S>,
    rpc: Arc<R>,
    queue: Arc<TaskQueue<SyncTask>>,
    state: Mutex<SchedulerState>,
    events: mpsc::UnboundedSender<SyncEvent>,
    settings: SyncSettings,
    shutting_down: AtomicBool,
}

impl<S, R> std::fmt::Debug for HistoricalSyncService<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalSyncService")
            .field("chain_id", &self.chain_id)
            .field("chain", &self.chain)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl<S, R> HistoricalSyncService<S, R>
where
    S: SyncStore + 'static,
    R: RpcClient + 'static,
{
    /// Create a scheduler and the receiver for its emitted events.
    pub fn new(
        chain_id: ChainId,
        chain: impl Into<String>,
        sources: Vec<Source>,
        sync_store: Arc<S>,
        rpc: Arc<R>,
        settings: SyncSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let service = Self {
            chain_id,
            chain: chain.into(),
            sources,
            sync_store,
            rpc,
            queue: Arc::new(TaskQueue::new()),
            state: Mutex::new(SchedulerState::default()),
            events,
            settings,
            shutting_down: AtomicBool::new(false),
        };
        (service, receiver)
    }

    /// The task queue (exposed for tests and supervision).
    #[must_use]
    pub fn queue(&self) -> &TaskQueue<SyncTask> {
        &self.queue
    }

    // ───────────────────────────────────────────────────────────────────────────
    // STARTUP
    // ───────────────────────────────────────────────────────────────────────────

    /// Load cached intervals and enqueue the initial task set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSourceRange`] for a source whose range
    /// is inconsistent with the chain head, or a database error from
    /// interval loading.
    #[instrument(skip(self), fields(chain = %self.chain))]
    pub async fn setup(&self, finalized_block: u64, latest_block: u64) -> Result<()> {
        let start_ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        gauge!(metric_names::HISTORICAL_START_TIMESTAMP, "chain" => self.chain.clone())
            .set(start_ts as f64);

        {
            let mut state = self.state.lock();
            state.finalized_block = finalized_block;
            state.started_at = Some(Instant::now());
        }

        for (index, source) in self.sources.iter().enumerate() {
            self.setup_source(index, source, finalized_block, latest_block)
                .await?;
        }

        // Everything already cached: advertise the finalized block so
        // downstream consumers do not wait on an idle queue.
        let all_complete = {
            let state = self.state.lock();
            state.trackers.iter().all(ProgressTracker::is_complete)
                && state.child_trackers.values().all(ProgressTracker::is_complete)
        };
        if all_complete {
            info!(chain = %self.chain, "Historical sync fully cached");
            self.send_event(SyncEvent::Checkpoint {
                chain_id: self.chain_id,
                block_number: finalized_block,
                block_timestamp: start_ts,
            });
        }

        Ok(())
    }

    async fn setup_source(
        &self,
        index: usize,
        source: &Source,
        finalized_block: u64,
        latest_block: u64,
    ) -> Result<()> {
        let source_label = source.id().to_string();
        let type_label = source.kind_label();
        let start = source.start_block();

        // Sources that begin past the finalized block have nothing
        // historical to do yet.
        if start > finalized_block {
            warn!(
                chain = %self.chain,
                source = %source_label,
                start_block = start,
                finalized_block,
                "Source start block is unfinalized, skipping historical sync"
            );
            let mut state = self.state.lock();
            state
                .trackers
                .push(ProgressTracker::new(IntervalSet::new(), IntervalSet::new())?);
            state.initial_cached.push(0);
            drop(state);
            self.set_block_gauges(&source_label, type_label, 0, 0);
            return Ok(());
        }

        let end = source.end_block().unwrap_or(finalized_block);
        if start > latest_block || end > finalized_block || start > end {
            return Err(SyncError::InvalidSourceRange {
                source_id: source_label,
                start,
                end,
                latest: latest_block,
                finalized: finalized_block,
            }
            .into());
        }

        let target = IntervalSet::of(start, end);
        let chunk_size = self.chunk_size(source);

        match source {
            Source::LogFilter(s) => {
                let cached = self
                    .sync_store
                    .get_log_filter_intervals(self.chain_id, &s.id)
                    .await?;
                let tracker =
                    ProgressTracker::new(target.clone(), cached.intersection(&target))?;
                for chunk in tracker.required().chunks(chunk_size) {
                    self.enqueue(SyncTask::LogFilter {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                self.finish_source_setup(index, &source_label, type_label, tracker, None);
            }
            Source::FactoryLog(s) => {
                let cached = self
                    .sync_store
                    .get_factory_log_filter_intervals(self.chain_id, s)
                    .await?;
                let tracker =
                    ProgressTracker::new(target.clone(), cached.intersection(&target))?;

                let child_cached = self
                    .sync_store
                    .get_log_filter_intervals(self.chain_id, &s.id.child_discovery())
                    .await?;
                let child_tracker =
                    ProgressTracker::new(target.clone(), child_cached.intersection(&target))?;

                let child_required = child_tracker.required();
                for chunk in child_required.chunks(chunk_size) {
                    self.enqueue(SyncTask::FactoryChild {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                // Ranges where child discovery is already cached but the
                // factory log filter is not can start immediately.
                for chunk in tracker.required().difference(&child_required).chunks(chunk_size) {
                    self.enqueue(SyncTask::FactoryLogFilter {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                self.finish_source_setup(
                    index,
                    &source_label,
                    type_label,
                    tracker,
                    Some(child_tracker),
                );
            }
            Source::CallTrace(s) => {
                let cached = self
                    .sync_store
                    .get_trace_filter_intervals(self.chain_id, s)
                    .await?;
                let tracker =
                    ProgressTracker::new(target.clone(), cached.intersection(&target))?;
                for chunk in tracker.required().chunks(chunk_size) {
                    self.enqueue(SyncTask::Trace {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                self.finish_source_setup(index, &source_label, type_label, tracker, None);
            }
            Source::FactoryCallTrace(s) => {
                let cached = self
                    .sync_store
                    .get_factory_trace_filter_intervals(self.chain_id, s)
                    .await?;
                let tracker =
                    ProgressTracker::new(target.clone(), cached.intersection(&target))?;

                let child_cached = self
                    .sync_store
                    .get_log_filter_intervals(self.chain_id, &s.id.child_discovery())
                    .await?;
                let child_tracker =
                    ProgressTracker::new(target.clone(), child_cached.intersection(&target))?;

                let child_required = child_tracker.required();
                // Child discovery is a log scan; it chunks at the log range.
                for chunk in child_required.chunks(self.settings.default_max_block_range) {
                    self.enqueue(SyncTask::FactoryChild {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                for chunk in tracker.required().difference(&child_required).chunks(chunk_size) {
                    self.enqueue(SyncTask::FactoryTrace {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                self.finish_source_setup(
                    index,
                    &source_label,
                    type_label,
                    tracker,
                    Some(child_tracker),
                );
            }
            Source::BlockInterval(s) => {
                let cached = self
                    .sync_store
                    .get_block_filter_intervals(self.chain_id, s)
                    .await?;
                let tracker =
                    ProgressTracker::new(target.clone(), cached.intersection(&target))?;
                for chunk in tracker.required().chunks(chunk_size) {
                    self.enqueue(SyncTask::BlockInterval {
                        source_index: index,
                        from: chunk.lo,
                        to: chunk.hi,
                    });
                }
                self.finish_source_setup(index, &source_label, type_label, tracker, None);
            }
        }

        Ok(())
    }

    fn finish_source_setup(
        &self,
        index: usize,
        source_label: &str,
        type_label: &'static str,
        tracker: ProgressTracker,
        child_tracker: Option<ProgressTracker>,
    ) {
        let total = tracker.total_blocks();
        let cached = tracker.cached_blocks();
        info!(
            chain = %self.chain,
            source = source_label,
            total_blocks = total,
            cached_blocks = cached,
            "Started historical sync for source"
        );
        self.set_block_gauges(source_label, type_label, total, cached);

        let mut state = self.state.lock();
        state.trackers.push(tracker);
        state.initial_cached.push(cached);
        if let Some(child) = child_tracker {
            state.child_trackers.insert(index, child);
        }
    }

    fn set_block_gauges(&self, source: &str, type_label: &'static str, total: u64, cached: u64) {
        #[allow(clippy::cast_precision_loss)]
        {
            gauge!(
                metric_names::HISTORICAL_TOTAL_BLOCKS,
                "chain" => self.chain.clone(),
                "source" => source.to_string(),
                "type" => type_label
            )
            .set(total as f64);
            gauge!(
                metric_names::HISTORICAL_CACHED_BLOCKS,
                "chain" => self.chain.clone(),
                "source" => source.to_string(),
                "type" => type_label
            )
            .set(cached as f64);
        }
    }

    fn chunk_size(&self, source: &Source) -> u64 {
        if source.is_trace() {
            return self.settings.trace_block_range;
        }
        match source {
            Source::LogFilter(s) => s.max_range,
            Source::FactoryLog(s) => s.max_range,
            _ => None,
        }
        .unwrap_or(self.settings.default_max_block_range)
    }

    fn enqueue(&self, task: SyncTask) {
        let priority = task.priority();
        self.queue.add_task(task, priority);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // RUN LOOP
    // ───────────────────────────────────────────────────────────────────────────

    /// Drive the queue until every source completes or [`Self::kill`] is
    /// called. Emits `SyncComplete` on a clean finish.
    ///
    /// # Errors
    ///
    /// Task failures are retried internally; this only fails on event
    /// channel setup problems, which cannot currently occur.
    pub async fn run(&self) -> Result<()> {
        let drive = self.queue.drive(
            self.settings.max_task_concurrency,
            |task| self.execute_task(task),
            |error, task| self.handle_task_error(&error, task),
        );
        tokio::pin!(drive);

        let mut ticker = tokio::time::interval(self.settings.progress_log_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // First tick resolves immediately.

        loop {
            tokio::select! {
                () = &mut drive => break,
                _ = ticker.tick() => self.log_progress(),
            }
        }

        if !self.shutting_down.load(Ordering::SeqCst) {
            let pending = self.state.lock().pending_checkpoint.take();
            if let Some((block_number, block_timestamp)) = pending {
                self.send_event(SyncEvent::Checkpoint {
                    chain_id: self.chain_id,
                    block_number,
                    block_timestamp,
                });
            }
            info!(chain = %self.chain, "Historical sync complete");
            self.send_event(SyncEvent::SyncComplete {
                chain_id: self.chain_id,
            });
        }

        Ok(())
    }

    /// Request shutdown: pause and clear the queue. In-flight tasks
    /// finish but are not retried.
    pub fn kill(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.queue.pause();
        self.queue.clear();
        info!(chain = %self.chain, "Historical sync killed");
    }

    fn handle_task_error(&self, error: &AppError, task: &SyncTask) -> ErrorDisposition {
        if self.shutting_down.load(Ordering::SeqCst) {
            return ErrorDisposition::Discard;
        }
        warn!(
            chain = %self.chain,
            task = task.kind(),
            ?task,
            %error,
            "Historical sync task failed, retrying"
        );
        ErrorDisposition::Requeue {
            priority: task.priority(),
        }
    }

    fn send_event(&self, event: SyncEvent) {
        // The receiver dropping just means nobody is listening anymore.
        let _ = self.events.send(event);
    }

    fn log_progress(&self) {
        let state = self.state.lock();
        let Some(started_at) = state.started_at else {
            return;
        };
        let elapsed = started_at.elapsed().as_secs_f64();

        for (index, source) in self.sources.iter().enumerate() {
            let Some(tracker) = state.trackers.get(index) else {
                continue;
            };
            let total = tracker.total_blocks();
            if total == 0 {
                continue;
            }
            let done = tracker.cached_blocks();
            let initial = state.initial_cached.get(index).copied().unwrap_or(0);

            #[allow(clippy::cast_precision_loss)]
            let progress = done as f64 / total as f64 * 100.0;
            #[allow(clippy::cast_precision_loss)]
            let rate = (done.saturating_sub(initial)) as f64 / elapsed.max(0.001);
            #[allow(clippy::cast_precision_loss)]
            let eta_secs = if rate > 0.0 {
                Some(((total - done) as f64 / rate).round())
            } else {
                None
            };

            info!(
                chain = %self.chain,
                source = %source.id(),
                progress = format!("{progress:.1}%"),
                eta_secs,
                "Historical sync progress"
            );
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TASK EXECUTION
    // ───────────────────────────────────────────────────────────────────────────

    async fn execute_task(&self, task: SyncTask) -> Result<()> {
        debug!(chain = %self.chain, task = task.kind(), ?task, "Executing sync task");
        match task {
            SyncTask::LogFilter {
                source_index,
                from,
                to,
            } => self.run_log_filter(source_index, from, to).await,
            SyncTask::FactoryChild {
                source_index,
                from,
                to,
            } => self.run_factory_child(source_index, from, to).await,
            SyncTask::FactoryLogFilter {
                source_index,
                from,
                to,
            } => self.run_factory_log_filter(source_index, from, to).await,
            SyncTask::Trace {
                source_index,
                from,
                to,
            } => self.run_trace(source_index, from, to).await,
            SyncTask::FactoryTrace {
                source_index,
                from,
                to,
            } => self.run_factory_trace(source_index, from, to).await,
            SyncTask::BlockInterval {
                source_index,
                from,
                to,
            } => self.run_block_interval(source_index, from, to).await,
            SyncTask::Block { number } => self.run_block(number).await,
        }
    }

    /// `eth_getLogs` with recursive range splitting on range errors.
    fn fetch_logs_split(&self, query: LogQuery) -> BoxFuture<'_, Result<Vec<ChainLog>>> {
        async move {
            match self.rpc.get_logs(&query).await {
                Ok(logs) => Ok(logs),
                Err(error)
                    if error.should_split_range() && query.from_block < query.to_block =>
                {
                    let mid = query.from_block + (query.to_block - query.from_block) / 2;
                    debug!(
                        chain = %self.chain,
                        from = query.from_block,
                        to = query.to_block,
                        mid,
                        %error,
                        "Splitting log request range"
                    );
                    let mut left = self
                        .fetch_logs_split(LogQuery {
                            to_block: mid,
                            ..query.clone()
                        })
                        .await?;
                    let right = self
                        .fetch_logs_split(LogQuery {
                            from_block: mid + 1,
                            ..query
                        })
                        .await?;
                    left.extend(right);
                    Ok(left)
                }
                Err(error) => Err(error.into()),
            }
        }
        .boxed()
    }

    /// `trace_filter` with recursive range splitting on range errors.
    fn fetch_traces_split(&self, query: TraceQuery) -> BoxFuture<'_, Result<Vec<CallTraceFrame>>> {
        async move {
            match self.rpc.trace_filter(&query).await {
                Ok(traces) => Ok(traces),
                Err(error)
                    if error.should_split_range() && query.from_block < query.to_block =>
                {
                    let mid = query.from_block + (query.to_block - query.from_block) / 2;
                    let mut left = self
                        .fetch_traces_split(TraceQuery {
                            to_block: mid,
                            ..query.clone()
                        })
                        .await?;
                    let right = self
                        .fetch_traces_split(TraceQuery {
                            from_block: mid + 1,
                            ..query
                        })
                        .await?;
                    left.extend(right);
                    Ok(left)
                }
                Err(error) => Err(error.into()),
            }
        }
        .boxed()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // LOG FILTER TASKS
    // ───────────────────────────────────────────────────────────────────────────

    async fn run_log_filter(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Source::LogFilter(source) = &self.sources[source_index] else {
            return Ok(());
        };

        let logs = self
            .fetch_logs_split(LogQuery {
                addresses: source.address.clone(),
                topics: source.topics.clone(),
                from_block: from,
                to_block: to,
            })
            .await?;

        let pieces = build_log_pieces(from, to, logs);
        let source_id = source.id.clone();
        self.commit_log_pieces(source_index, &source_id, from, to, pieces, false);
        Ok(())
    }

    /// Register per-block persistence callbacks for log pieces, advance
    /// the tracker, and release any newly safe block tasks. One
    /// synchronous critical section.
    fn commit_log_pieces(
        &self,
        source_index: usize,
        interval_source_id: &SourceId,
        from: u64,
        to: u64,
        pieces: Vec<(Interval, Vec<ChainLog>)>,
        factory_variant: bool,
    ) {
        let mut state = self.state.lock();

        for (interval, logs) in pieces {
            let callback = self.log_piece_callback(source_index, interval_source_id, interval, logs, factory_variant);
            state
                .block_callbacks
                .entry(interval.hi)
                .or_default()
                .push(callback);
        }

        let advance = state.trackers[source_index].add_completed(Interval::new(from, to));
        debug!(
            chain = %self.chain,
            source = %self.sources[source_index].id(),
            from,
            to,
            new_checkpoint = advance.new,
            "Completed log range"
        );
        self.count_completed_blocks(source_index, to - from + 1);

        self.enqueue_block_tasks(&mut state);
    }

    fn log_piece_callback(
        &self,
        source_index: usize,
        interval_source_id: &SourceId,
        interval: Interval,
        logs: Vec<ChainLog>,
        factory_variant: bool,
    ) -> BlockCallback {
        let store = Arc::clone(&self.sync_store);
        let chain_id = self.chain_id;
        let source_id = interval_source_id.clone();
        let factory_source = if factory_variant {
            match &self.sources[source_index] {
                Source::FactoryLog(s) => Some(s.clone()),
                _ => None,
            }
        } else {
            None
        };

        Arc::new(move |block: Arc<ChainBlock>| {
            let store = Arc::clone(&store);
            let source_id = source_id.clone();
            let factory_source = factory_source.clone();
            let logs = logs.clone();
            async move {
                let tx_hashes = ChainLog::distinct_transaction_hashes(&logs);
                let transactions = block.select_transactions(&tx_hashes);
                match factory_source {
                    Some(source) => {
                        store
                            .insert_factory_log_filter_interval(
                                chain_id,
                                &source,
                                &block,
                                &transactions,
                                &logs,
                                interval,
                            )
                            .await
                    }
                    None => {
                        store
                            .insert_log_filter_interval(
                                chain_id,
                                &source_id,
                                &block,
                                &transactions,
                                &logs,
                                interval,
                            )
                            .await
                    }
                }
            }
            .boxed()
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // FACTORY TASKS
    // ───────────────────────────────────────────────────────────────────────────

    fn factory_parts(&self, source_index: usize) -> Option<(crate::types::source::FactoryCriteria, SourceId, u64, bool)> {
        match &self.sources[source_index] {
            Source::FactoryLog(s) => Some((
                s.factory.clone(),
                s.id.child_discovery(),
                s.max_range.unwrap_or(self.settings.default_max_block_range),
                false,
            )),
            Source::FactoryCallTrace(s) => Some((
                s.factory.clone(),
                s.id.child_discovery(),
                self.settings.trace_block_range,
                true,
            )),
            _ => None,
        }
    }

    async fn run_factory_child(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Some((factory, child_id, follow_up_chunk, is_trace)) =
            self.factory_parts(source_index)
        else {
            return Ok(());
        };

        let topics: Topics = [Some(vec![factory.event_selector]), None, None, None];
        let logs = self
            .fetch_logs_split(LogQuery {
                addresses: Some(vec![factory.address]),
                topics,
                from_block: from,
                to_block: to,
            })
            .await?;

        let discovered = logs
            .iter()
            .filter(|log| extract_child_address(&factory, log).is_some())
            .count();
        debug!(
            chain = %self.chain,
            source = %self.sources[source_index].id(),
            from,
            to,
            discovered,
            "Discovered factory children"
        );

        self.sync_store
            .insert_factory_child_address_logs(self.chain_id, &factory, &logs)
            .await?;

        let pieces = build_log_pieces(from, to, logs);

        let mut state = self.state.lock();
        for (interval, piece_logs) in pieces {
            let callback =
                self.log_piece_callback(source_index, &child_id, interval, piece_logs, false);
            state
                .block_callbacks
                .entry(interval.hi)
                .or_default()
                .push(callback);
        }

        let start_block = self.sources[source_index].start_block();
        let advance = match state.child_trackers.get_mut(&source_index) {
            Some(child_tracker) => child_tracker.add_completed(Interval::new(from, to)),
            None => return Ok(()),
        };
        let follow_up = if advance.updated {
            let lo = advance.prev.map_or(start_block, |p| p + 1);
            let hi = advance.new.unwrap_or(lo);
            IntervalSet::of(lo, hi).intersection(&state.trackers[source_index].required())
        } else {
            IntervalSet::new()
        };

        // The watermark advanced: the factory filter may now run over the
        // newly discovered window.
        for chunk in follow_up.chunks(follow_up_chunk) {
            let task = if is_trace {
                SyncTask::FactoryTrace {
                    source_index,
                    from: chunk.lo,
                    to: chunk.hi,
                }
            } else {
                SyncTask::FactoryLogFilter {
                    source_index,
                    from: chunk.lo,
                    to: chunk.hi,
                }
            };
            let priority = task.priority();
            self.queue.add_task(task, priority);
        }

        self.enqueue_block_tasks(&mut state);
        Ok(())
    }

    async fn run_factory_log_filter(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Source::FactoryLog(source) = self.sources[source_index].clone() else {
            return Ok(());
        };

        let mut child_batches = self.sync_store.get_factory_child_addresses(
            self.chain_id,
            &source.factory,
            to,
            self.settings.child_address_batch_size,
        );

        let mut logs = Vec::new();
        while let Some(batch) = child_batches.try_next().await? {
            if batch.is_empty() {
                continue;
            }
            let batch_logs = self
                .fetch_logs_split(LogQuery {
                    addresses: Some(batch),
                    topics: source.topics.clone(),
                    from_block: from,
                    to_block: to,
                })
                .await?;
            logs.extend(batch_logs);
        }

        let pieces = build_log_pieces(from, to, logs);
        self.commit_log_pieces(source_index, &source.id, from, to, pieces, true);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TRACE TASKS
    // ───────────────────────────────────────────────────────────────────────────

    async fn run_trace(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Source::CallTrace(source) = self.sources[source_index].clone() else {
            return Ok(());
        };

        let traces = self
            .fetch_traces_split(TraceQuery {
                from_addresses: source.from_address.clone(),
                to_addresses: source.to_address.clone(),
                from_block: from,
                to_block: to,
            })
            .await?;

        self.commit_traces(source_index, from, to, traces).await
    }

    async fn run_factory_trace(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Source::FactoryCallTrace(source) = self.sources[source_index].clone() else {
            return Ok(());
        };

        let mut child_batches = self.sync_store.get_factory_child_addresses(
            self.chain_id,
            &source.factory,
            to,
            self.settings.child_address_batch_size,
        );

        let mut traces = Vec::new();
        while let Some(batch) = child_batches.try_next().await? {
            if batch.is_empty() {
                continue;
            }
            let batch_traces = self
                .fetch_traces_split(TraceQuery {
                    from_addresses: source.from_address.clone(),
                    to_addresses: Some(batch),
                    from_block: from,
                    to_block: to,
                })
                .await?;
            traces.extend(batch_traces);
        }

        self.commit_traces(source_index, from, to, traces).await
    }

    async fn commit_traces(
        &self,
        source_index: usize,
        from: u64,
        to: u64,
        traces: Vec<CallTraceFrame>,
    ) -> Result<()> {
        let calls: Vec<CallTraceFrame> =
            traces.into_iter().filter(CallTraceFrame::is_call).collect();

        // Receipts gate persistence: calls from reverted transactions are
        // dropped.
        let mut tx_hashes: Vec<B256> = Vec::new();
        for trace in &calls {
            if !tx_hashes.contains(&trace.transaction_hash) {
                tx_hashes.push(trace.transaction_hash);
            }
        }
        let receipts = try_join_all(tx_hashes.iter().map(|&hash| async move {
            self.rpc
                .get_transaction_receipt(hash)
                .await?
                .ok_or(RpcError::ReceiptNotFound(hash))
        }))
        .await?;

        let reverted: HashSet<B256> = receipts
            .iter()
            .filter(|r| !r.status)
            .map(|r| r.transaction_hash)
            .collect();
        let kept: Vec<CallTraceFrame> = calls
            .into_iter()
            .filter(|t| !reverted.contains(&t.transaction_hash))
            .collect();

        let pieces = build_trace_pieces(from, to, kept);

        let mut state = self.state.lock();
        for (interval, piece_traces) in pieces {
            let store = Arc::clone(&self.sync_store);
            let chain_id = self.chain_id;
            let source = self.sources[source_index].clone();
            let piece_receipts: Vec<_> = receipts
                .iter()
                .filter(|r| piece_traces.iter().any(|t| t.transaction_hash == r.transaction_hash))
                .cloned()
                .collect();

            let callback: BlockCallback = Arc::new(move |block: Arc<ChainBlock>| {
                let store = Arc::clone(&store);
                let source = source.clone();
                let piece_traces = piece_traces.clone();
                let piece_receipts = piece_receipts.clone();
                async move {
                    let tx_hashes: Vec<B256> =
                        piece_traces.iter().map(|t| t.transaction_hash).collect();
                    let transactions = block.select_transactions(&tx_hashes);
                    match source {
                        Source::CallTrace(s) => {
                            store
                                .insert_trace_filter_interval(
                                    chain_id,
                                    &s,
                                    &block,
                                    &transactions,
                                    &piece_receipts,
                                    &piece_traces,
                                    interval,
                                )
                                .await
                        }
                        Source::FactoryCallTrace(s) => {
                            store
                                .insert_factory_trace_filter_interval(
                                    chain_id,
                                    &s,
                                    &block,
                                    &transactions,
                                    &piece_receipts,
                                    &piece_traces,
                                    interval,
                                )
                                .await
                        }
                        _ => Ok(()),
                    }
                }
                .boxed()
            });

            state
                .block_callbacks
                .entry(interval.hi)
                .or_default()
                .push(callback);
        }

        state.trackers[source_index].add_completed(Interval::new(from, to));
        self.count_completed_blocks(source_index, to - from + 1);
        self.enqueue_block_tasks(&mut state);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // BLOCK INTERVAL TASKS
    // ───────────────────────────────────────────────────────────────────────────

    async fn run_block_interval(&self, source_index: usize, from: u64, to: u64) -> Result<()> {
        let Source::BlockInterval(source) = self.sources[source_index].clone() else {
            return Ok(());
        };

        let required = periodic_blocks(from, to, source.interval, source.offset);
        let mut callbacks: Vec<(u64, Interval)> = Vec::new();
        let mut prev = from;

        for block_number in required {
            let interval = Interval::new(prev, block_number);
            prev = block_number + 1;

            if self
                .sync_store
                .get_block(self.chain_id, block_number)
                .await?
                .is_some()
            {
                self.sync_store
                    .insert_block_filter_interval(self.chain_id, &source, interval)
                    .await?;
            } else {
                callbacks.push((block_number, interval));
            }
        }

        let mut state = self.state.lock();
        for (block_number, interval) in callbacks {
            let store = Arc::clone(&self.sync_store);
            let chain_id = self.chain_id;
            let source = source.clone();
            let callback: BlockCallback = Arc::new(move |block: Arc<ChainBlock>| {
                let store = Arc::clone(&store);
                let source = source.clone();
                async move {
                    store.insert_block(chain_id, &block).await?;
                    store
                        .insert_block_filter_interval(chain_id, &source, interval)
                        .await
                }
                .boxed()
            });
            state
                .block_callbacks
                .entry(block_number)
                .or_default()
                .push(callback);
        }

        state.trackers[source_index].add_completed(Interval::new(from, to));
        self.count_completed_blocks(source_index, to - from + 1);
        self.enqueue_block_tasks(&mut state);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // BLOCK TASKS
    // ───────────────────────────────────────────────────────────────────────────

    async fn run_block(&self, number: u64) -> Result<()> {
        let block = self
            .rpc
            .get_block_by_number(number)
            .await?
            .ok_or(RpcError::BlockNotFound(number))?;
        let block = Arc::new(block);

        let callbacks = {
            self.state
                .lock()
                .block_callbacks
                .remove(&number)
                .unwrap_or_default()
        };

        let result = try_join_all(callbacks.iter().map(|cb| cb(Arc::clone(&block)))).await;
        if let Err(error) = result {
            // Put the callbacks back; the retry re-runs them all, and the
            // store's inserts are idempotent.
            self.state
                .lock()
                .block_callbacks
                .entry(number)
                .or_default()
                .extend(callbacks);
            return Err(error);
        }

        let mut state = self.state.lock();
        if let Some((block_number, block_timestamp)) =
            state.block_progress.add_completed(number, block.timestamp)
        {
            self.emit_checkpoint_debounced(&mut state, block_number, block_timestamp);
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // WATERMARKS AND CHECKPOINTS
    // ───────────────────────────────────────────────────────────────────────────

    /// Enqueue block tasks for every callback height at or below the
    /// global safe watermark.
    ///
    /// The safe watermark is the minimum checkpoint across trackers that
    /// still have required work; completed trackers are excluded so a
    /// short, finished source cannot pin the chain. When every tracker is
    /// complete, the finalized block is safe.
    fn enqueue_block_tasks(&self, state: &mut SchedulerState) {
        let incomplete_checkpoints: Vec<Option<u64>> = state
            .trackers
            .iter()
            .chain(state.child_trackers.values())
            .filter(|t| !t.is_complete())
            .map(ProgressTracker::checkpoint)
            .collect();

        let safe = if incomplete_checkpoints.is_empty() {
            Some(state.finalized_block)
        } else if incomplete_checkpoints.iter().any(Option::is_none) {
            None
        } else {
            incomplete_checkpoints.into_iter().flatten().min()
        };

        let Some(safe) = safe else {
            return;
        };

        let already = state.block_tasks_enqueued;
        let ready: Vec<u64> = state
            .block_callbacks
            .range(..=safe)
            .map(|(&number, _)| number)
            .filter(|&number| already.is_none_or(|c| number > c))
            .collect();

        for number in &ready {
            state.block_progress.add_pending([*number]);
            self.queue.add_task(
                SyncTask::Block { number: *number },
                u64::MAX - *number,
            );
        }
        if !ready.is_empty() {
            debug!(chain = %self.chain, safe, count = ready.len(), "Enqueued block tasks");
        }

        state.block_tasks_enqueued = Some(already.map_or(safe, |c| c.max(safe)));
    }

    fn emit_checkpoint_debounced(&self, state: &mut SchedulerState, number: u64, timestamp: u64) {
        let now = Instant::now();
        let due = state
            .last_checkpoint_emit
            .is_none_or(|last| now.duration_since(last) >= self.settings.checkpoint_debounce());

        if due {
            state.last_checkpoint_emit = Some(now);
            state.pending_checkpoint = None;
            self.send_event(SyncEvent::Checkpoint {
                chain_id: self.chain_id,
                block_number: number,
                block_timestamp: timestamp,
            });
        } else {
            state.pending_checkpoint = Some((number, timestamp));
        }
    }

    fn count_completed_blocks(&self, source_index: usize, blocks: u64) {
        let source = &self.sources[source_index];
        counter!(
            metric_names::HISTORICAL_COMPLETED_BLOCKS,
            "chain" => self.chain.clone(),
            "source" => source.id().to_string(),
            "type" => source.kind_label()
        )
        .increment(blocks);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIECE CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Walk `[from, to]` ascending and cut it at every block that carries
/// logs, plus `to`. Each piece `[prev, b]` carries exactly the logs of
/// block `b`; gap-only pieces carry none.
fn build_log_pieces(from: u64, to: u64, logs: Vec<ChainLog>) -> Vec<(Interval, Vec<ChainLog>)> {
    let mut by_block: BTreeMap<u64, Vec<ChainLog>> = BTreeMap::new();
    for log in logs {
        if (from..=to).contains(&log.block_number) {
            by_block.entry(log.block_number).or_default().push(log);
        }
    }

    let mut required: BTreeSet<u64> = by_block.keys().copied().collect();
    required.insert(to);

    let mut pieces = Vec::with_capacity(required.len());
    let mut prev = from;
    for block_number in required {
        pieces.push((
            Interval::new(prev, block_number),
            by_block.remove(&block_number).unwrap_or_default(),
        ));
        prev = block_number + 1;
    }
    pieces
}

/// Same walk as [`build_log_pieces`], for call traces.
fn build_trace_pieces(
    from: u64,
    to: u64,
    traces: Vec<CallTraceFrame>,
) -> Vec<(Interval, Vec<CallTraceFrame>)> {
    let mut by_block: BTreeMap<u64, Vec<CallTraceFrame>> = BTreeMap::new();
    for trace in traces {
        if (from..=to).contains(&trace.block_number) {
            by_block.entry(trace.block_number).or_default().push(trace);
        }
    }

    let mut required: BTreeSet<u64> = by_block.keys().copied().collect();
    required.insert(to);

    let mut pieces = Vec::with_capacity(required.len());
    let mut prev = from;
    for block_number in required {
        pieces.push((
            Interval::new(prev, block_number),
            by_block.remove(&block_number).unwrap_or_default(),
        ));
        prev = block_number + 1;
    }
    pieces
}

/// Blocks of a periodic source inside `[from, to]`: every block congruent
/// to `offset` modulo `interval`, with `to` appended so the covering
/// interval closes.
fn periodic_blocks(from: u64, to: u64, interval: u64, offset: u64) -> Vec<u64> {
    let interval = interval.max(1);
    let phase = offset % interval;
    let delta = (phase + interval - from % interval) % interval;

    let mut blocks = Vec::new();
    let mut current = from + delta;
    while current <= to {
        blocks.push(current);
        match current.checked_add(interval) {
            Some(next) => current = next,
            None => break,
        }
    }
    if blocks.last() != Some(&to) {
        blocks.push(to);
    }
    blocks
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
