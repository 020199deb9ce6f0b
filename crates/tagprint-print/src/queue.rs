// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial job queue.
//
// Print submissions must never overlap: the queue runs one task at a time, in
// the order the tasks were enqueued.  A single drain task pops the head of the
// queue, awaits it, and moves on to the next one until the queue is empty.
// Failures, panics and timeouts are logged and counted, never propagated.
//
// The queue is unbounded and in memory only.  Anything still pending when the
// process exits is lost; callers that care persist their own bookkeeping.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use tagprint_core::error::Result;

/// Future returned by a queued task.
pub type TaskFuture = BoxFuture<'static, Result<()>>;

type Task = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;

struct QueuedTask {
    seq: u64,
    run: Task,
}

/// Running totals, for status output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub succeeded: u64,
    /// Tasks that returned an error or panicked.
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    draining: bool,
    next_seq: u64,
    stats: QueueStats,
}

struct Shared {
    state: Mutex<QueueState>,
    /// `true` while nothing is pending and nothing is running.
    idle: watch::Sender<bool>,
    task_timeout: Option<Duration>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Tasks never run under the lock, so a poisoned state is still
        // consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO queue that runs asynchronous tasks strictly one at a time.
///
/// Cloning yields another handle to the same queue.  `enqueue` must be called
/// from within a Tokio runtime.
#[derive(Clone)]
pub struct SerialJobQueue {
    shared: Arc<Shared>,
}

impl Default for SerialJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialJobQueue {
    /// A queue whose tasks may run for as long as they like.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A queue that abandons any task still running after `limit`.
    pub fn with_task_timeout(limit: Duration) -> Self {
        Self::build(Some(limit))
    }

    fn build(task_timeout: Option<Duration>) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                idle,
                task_timeout,
            }),
        }
    }

    /// Append `task` to the queue and start draining if nobody is.
    ///
    /// The task's outcome is not reported back; capture it inside the task if
    /// it matters.  Safe to call from inside a running task.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let start_drain = {
            let mut state = self.shared.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.stats.enqueued += 1;
            state.pending.push_back(QueuedTask {
                seq,
                run: Box::new(move || task().boxed()),
            });
            debug!(seq, pending = state.pending.len(), "task enqueued");

            if state.draining {
                false
            } else {
                state.draining = true;
                self.shared.idle.send_replace(false);
                true
            }
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }
    }

    /// Tasks waiting to run, not counting the one in flight.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether a task is currently running (or about to be picked up).
    pub fn is_draining(&self) -> bool {
        self.shared.lock().draining
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }

    /// Resolve once the queue is empty and no task is running.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives in `self.shared`, so the channel cannot close here.
        let _ = idle.wait_for(|is_idle| *is_idle).await;
    }
}

async fn drain(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(task) => task,
                None => {
                    state.draining = false;
                    shared.idle.send_replace(true);
                    debug!(stats = ?state.stats, "queue drained");
                    return;
                }
            }
        };

        let outcome = run_task(next, shared.task_timeout).await;

        {
            let mut state = shared.lock();
            match outcome {
                TaskOutcome::Succeeded => state.stats.succeeded += 1,
                TaskOutcome::Failed => state.stats.failed += 1,
                TaskOutcome::TimedOut => state.stats.timed_out += 1,
            }
        }
    }
}

async fn run_task(task: QueuedTask, timeout: Option<Duration>) -> TaskOutcome {
    let seq = task.seq;
    debug!(seq, "task started");

    // The task body is created inside the guarded future so a panic while
    // building it is caught as well.
    let run = task.run;
    let guarded = AssertUnwindSafe(async move { run().await }).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => {
                warn!(seq, timeout_ms = limit.as_millis() as u64, "task timed out, moving on");
                return TaskOutcome::TimedOut;
            }
        },
        None => guarded.await,
    };

    match result {
        Ok(Ok(())) => {
            debug!(seq, "task succeeded");
            TaskOutcome::Succeeded
        }
        Ok(Err(e)) => {
            warn!(seq, error = %e, "task failed");
            TaskOutcome::Failed
        }
        Err(_) => {
            error!(seq, "task panicked");
            TaskOutcome::Failed
        }
    }
}
