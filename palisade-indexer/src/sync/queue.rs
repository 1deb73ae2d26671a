//! Bounded-concurrency priority task queue.
//!
//! The historical scheduler pushes typed tasks with a priority
//! (`u64::MAX − from_block`, so the earliest blocks run first) and drives
//! them through a cooperative pump: up to `max_concurrency` worker futures
//! are polled in a single [`FuturesUnordered`], never spawned. Sections
//! between awaits therefore run without interleaving, which the trackers
//! rely on.
//!
//! Failed tasks are routed to an error hook that decides between
//! re-enqueueing (with the same or adjusted priority) and discarding
//! (shutdown).

use std::collections::BinaryHeap;
use std::future::Future;

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

// ═══════════════════════════════════════════════════════════════════════════════
// PRIORITY ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

/// A queued task with its priority and insertion sequence.
///
/// Higher priority runs first; ties run in insertion order.
#[derive(Debug)]
struct Queued<T> {
    priority: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap on priority, min on sequence for FIFO ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TASK QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// What the error hook decided to do with a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Put the task back with the given priority.
    Requeue {
        /// Priority for the retry.
        priority: u64,
    },
    /// Drop the task (shutdown path).
    Discard,
}

#[derive(Debug)]
struct QueueState<T> {
    heap: BinaryHeap<Queued<T>>,
    next_seq: u64,
    in_flight: usize,
    paused: bool,
}

/// Priority queue with bounded-concurrency cooperative execution.
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    idle: Notify,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Create an empty, running queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                in_flight: 0,
                paused: false,
            }),
            notify: Notify::new(),
            idle: Notify::new(),
        }
    }

    /// Enqueue a task.
    pub fn add_task(&self, task: T, priority: u64) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued {
            priority,
            seq,
            task,
        });
        drop(state);
        self.notify.notify_waiters();
    }

    /// Number of queued (not yet started) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether no tasks are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Number of tasks currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Stop starting new tasks. In-flight tasks finish.
    pub fn pause(&self) {
        self.state.lock().paused = true;
        self.notify.notify_waiters();
    }

    /// Resume starting tasks.
    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.notify.notify_waiters();
    }

    /// Drop every queued task. In-flight tasks finish.
    pub fn clear(&self) {
        self.state.lock().heap.clear();
        self.notify.notify_waiters();
    }

    /// Completes once no task is queued or in flight.
    pub async fn on_idle(&self) {
        loop {
            let wakeup = self.idle.notified();
            {
                let state = self.state.lock();
                if state.heap.is_empty() && state.in_flight == 0 {
                    return;
                }
            }
            wakeup.await;
        }
    }

    fn pop(&self) -> Option<(T, u64)> {
        let mut state = self.state.lock();
        if state.paused {
            return None;
        }
        let queued = state.heap.pop()?;
        state.in_flight += 1;
        Some((queued.task, queued.priority))
    }

    fn finish_one(&self) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        let idle = state.heap.is_empty() && state.in_flight == 0;
        drop(state);
        if idle {
            self.idle.notify_waiters();
        }
    }
}

impl<T: Clone> TaskQueue<T> {
    /// Pump tasks until the queue drains.
    ///
    /// Runs up to `max_concurrency` `worker` futures cooperatively. When a
    /// worker fails, `on_error` chooses between re-enqueueing and
    /// discarding. Returns when the heap is empty and nothing is in
    /// flight; tasks enqueued by running workers (or by other tasks on the
    /// runtime) extend the run.
    pub async fn drive<W, Fut, E, H>(&self, max_concurrency: usize, worker: W, on_error: H)
    where
        W: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        H: Fn(E, &T) -> ErrorDisposition,
    {
        let max_concurrency = max_concurrency.max(1);
        let mut running = FuturesUnordered::new();

        loop {
            let wakeup = self.notify.notified();
            tokio::pin!(wakeup);

            while running.len() < max_concurrency {
                match self.pop() {
                    Some((task, _priority)) => {
                        let retry = task.clone();
                        running.push(worker(task).map(move |result| (retry, result)));
                    }
                    None => break,
                }
            }

            if running.is_empty() {
                if self.is_empty() {
                    break;
                }
                // Paused with work queued: wait for resume or clear.
                wakeup.await;
                continue;
            }

            tokio::select! {
                completed = running.next() => {
                    if let Some((task, result)) = completed {
                        if let Err(error) = result {
                            match on_error(error, &task) {
                                ErrorDisposition::Requeue { priority } => {
                                    self.add_task(task, priority);
                                }
                                ErrorDisposition::Discard => {}
                            }
                        }
                        self.finish_one();
                    }
                }
                () = &mut wakeup => {}
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex as PlMutex;

    use super::*;

    #[tokio::test]
    async fn runs_in_priority_order() {
        let queue = TaskQueue::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        queue.add_task(30u64, u64::MAX - 30);
        queue.add_task(10, u64::MAX - 10);
        queue.add_task(20, u64::MAX - 20);

        let seen_ref = Arc::clone(&seen);
        queue
            .drive(
                1,
                |task| {
                    let seen = Arc::clone(&seen_ref);
                    async move {
                        seen.lock().push(task);
                        Ok::<(), ()>(())
                    }
                },
                |(), _| ErrorDisposition::Discard,
            )
            .await;

        assert_eq!(*seen.lock(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn ties_run_in_insertion_order() {
        let queue = TaskQueue::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        for i in 0..5u64 {
            queue.add_task(i, 42);
        }

        let seen_ref = Arc::clone(&seen);
        queue
            .drive(
                1,
                |task| {
                    let seen = Arc::clone(&seen_ref);
                    async move {
                        seen.lock().push(task);
                        Ok::<(), ()>(())
                    }
                },
                |(), _| ErrorDisposition::Discard,
            )
            .await;

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let queue = TaskQueue::new();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..20u64 {
            queue.add_task(i, u64::MAX - i);
        }

        let current_ref = Arc::clone(&current);
        let peak_ref = Arc::clone(&peak);
        queue
            .drive(
                4,
                |_task| {
                    let current = Arc::clone(&current_ref);
                    let peak = Arc::clone(&peak_ref);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), ()>(())
                    }
                },
                |(), _| ErrorDisposition::Discard,
            )
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn error_hook_requeues_for_retry() {
        let queue = TaskQueue::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        queue.add_task("flaky", 1);

        let attempts_ref = Arc::clone(&attempts);
        queue
            .drive(
                2,
                |_task| {
                    let attempts = Arc::clone(&attempts_ref);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err("boom")
                        } else {
                            Ok(())
                        }
                    }
                },
                |_err, _task| ErrorDisposition::Requeue { priority: 1 },
            )
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn workers_can_enqueue_more_tasks() {
        let queue = Arc::new(TaskQueue::new());
        let done = Arc::new(AtomicUsize::new(0));

        queue.add_task(0u64, 100);

        let queue_ref = Arc::clone(&queue);
        let done_ref = Arc::clone(&done);
        queue
            .drive(
                2,
                |task| {
                    let queue = Arc::clone(&queue_ref);
                    let done = Arc::clone(&done_ref);
                    async move {
                        if task < 4 {
                            queue.add_task(task + 1, 100 - task);
                        }
                        done.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), ()>(())
                    }
                },
                |(), _| ErrorDisposition::Discard,
            )
            .await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn clear_drops_queued_tasks() {
        let queue = TaskQueue::<u64>::new();
        queue.add_task(1, 1);
        queue.add_task(2, 2);
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());

        // Drive returns immediately on an empty queue.
        queue
            .drive(2, |_| async { Ok::<(), ()>(()) }, |(), _| {
                ErrorDisposition::Discard
            })
            .await;
    }

    #[tokio::test]
    async fn pause_then_clear_unblocks_drive() {
        let queue = Arc::new(TaskQueue::<u64>::new());
        queue.add_task(1, 1);
        queue.pause();

        let driver = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .drive(2, |_| async { Ok::<(), ()>(()) }, |(), _| {
                        ErrorDisposition::Discard
                    })
                    .await;
            })
        };

        // Give the driver a chance to park on the pause.
        tokio::task::yield_now().await;
        queue.clear();

        driver.await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn on_idle_completes_after_drain() {
        let queue = Arc::new(TaskQueue::new());
        queue.add_task(1u64, 1);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.on_idle().await })
        };

        queue
            .drive(1, |_| async { Ok::<(), ()>(()) }, |(), _| {
                ErrorDisposition::Discard
            })
            .await;

        waiter.await.unwrap();
    }
}
