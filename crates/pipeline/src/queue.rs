//! Reprioritizable bounded-concurrency task queue
//!
//! The scheduler behind the filter pipeline: tasks are queued with a
//! numeric priority and an optional grouping tag, kept sorted by
//! descending priority (stable, so equal priorities run FIFO), and started
//! whenever the in-flight count is below the concurrency limit.
//! [`OrderedPriorityQueue::prioritize`] records a boost tag; while it is
//! set, the next dequeue takes the most recently inserted pending task
//! whose tag matches, regardless of priority.
//!
//! "Concurrency" counts in-flight async tasks on the runtime, not threads.
//! Clearing the queue drops pending tasks only; running tasks finish and
//! their outcomes are discarded by the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error};

use crate::error::{PipelineError, PipelineResult};

/// Options for [`OrderedPriorityQueue::add`].
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Higher priority runs first.
    pub priority: i64,
    /// Grouping tag used by [`OrderedPriorityQueue::prioritize`].
    pub tag: Option<String>,
}

struct Pending<T> {
    priority: i64,
    tag: Option<String>,
    job: BoxFuture<'static, T>,
    done: oneshot::Sender<T>,
}

struct Inner<T> {
    /// Sorted by descending priority; ties keep insertion order.
    pending: Vec<Pending<T>>,
    running: usize,
    concurrency: usize,
    boost_tag: Option<String>,
    /// Signaled whenever a task finishes or the queue is cleared.
    done_signal: Arc<Notify>,
}

/// A priority task queue with a concurrency bound and tag-based boosting.
pub struct OrderedPriorityQueue<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for OrderedPriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Resolves to the task's outcome, or [`PipelineError::TaskDropped`] if the
/// task was cleared before it ran.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = PipelineResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| PipelineError::TaskDropped))
    }
}

impl<T: Send + 'static> OrderedPriorityQueue<T> {
    /// Create a queue with no effective concurrency bound.
    pub fn new() -> Self {
        Self::with_concurrency(usize::MAX)
    }

    /// Create a queue running at most `concurrency` tasks at once.
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: Vec::new(),
                running: 0,
                concurrency,
                boost_tag: None,
                done_signal: Arc::new(Notify::new()),
            })),
        }
    }

    /// Queue `job` and return a handle to its outcome. The job starts once
    /// capacity allows and its turn comes up.
    pub fn add<F>(&self, job: F, options: QueueOptions) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            // Stable insertion point: after all entries of >= priority.
            let idx = inner
                .pending
                .partition_point(|p| p.priority >= options.priority);
            inner.pending.insert(
                idx,
                Pending {
                    priority: options.priority,
                    tag: options.tag,
                    job: job.boxed(),
                    done,
                },
            );
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { pump(&inner) });
        TaskHandle { rx }
    }

    /// Record `tag` as the boost tag: until no pending task matches it, the
    /// most recently inserted matching task is dequeued first.
    pub fn prioritize(&self, tag: &str) {
        self.inner.lock().unwrap().boost_tag = Some(tag.to_string());
    }

    /// Discard all pending (not-yet-started) tasks. Their handles resolve
    /// with [`PipelineError::TaskDropped`]; running tasks finish normally.
    pub fn clear(&self) {
        let dropped = {
            let mut inner = self.inner.lock().unwrap();
            let n = inner.pending.len();
            inner.pending.clear();
            inner.done_signal.notify_one();
            n
        };
        if dropped > 0 {
            debug!(dropped, "cleared pending queue tasks");
        }
    }

    /// Number of queued tasks not yet started.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Number of tasks currently in flight.
    pub fn running(&self) -> usize {
        self.inner.lock().unwrap().running
    }

    /// Wait until the queue has no pending and no running tasks.
    pub async fn idle(&self) {
        loop {
            let signal = {
                let inner = self.inner.lock().unwrap();
                if inner.pending.is_empty() && inner.running == 0 {
                    return;
                }
                Arc::clone(&inner.done_signal)
            };
            signal.notified().await;
            let inner = self.inner.lock().unwrap();
            if inner.pending.is_empty() && inner.running == 0 {
                // Pass the wakeup on in case another waiter is parked.
                inner.done_signal.notify_one();
                return;
            }
        }
    }
}

impl<T: Send + 'static> Default for OrderedPriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Start pending tasks until the concurrency limit is reached.
fn pump<T: Send + 'static>(inner: &Arc<Mutex<Inner<T>>>) {
    loop {
        let entry = {
            let mut guard = inner.lock().unwrap();
            if guard.running >= guard.concurrency || guard.pending.is_empty() {
                return;
            }
            let idx = match guard.boost_tag.take() {
                Some(tag) => {
                    match guard
                        .pending
                        .iter()
                        .rposition(|p| p.tag.as_deref() == Some(tag.as_str()))
                    {
                        Some(i) => {
                            guard.boost_tag = Some(tag);
                            i
                        }
                        // Nothing left for the boost tag; resume normal
                        // priority order.
                        None => 0,
                    }
                }
                None => 0,
            };
            guard.running += 1;
            guard.pending.remove(idx)
        };

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            // The job runs in its own task so a panic inside it cannot take
            // the completion bookkeeping down with it; the handle's sender
            // is dropped in that case and the caller sees a dropped task.
            match tokio::spawn(entry.job).await {
                Ok(out) => {
                    if entry.done.send(out).is_err() {
                        debug!("task outcome discarded; caller no longer waiting");
                    }
                }
                Err(join_error) => {
                    error!(%join_error, "queued task panicked");
                }
            }
            {
                let mut guard = inner.lock().unwrap();
                guard.running -= 1;
                guard.done_signal.notify_one();
            }
            pump(&inner);
        });
    }
}
