//! Single background thread draining a due-time ordered queue

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{DelayScheduler, DelayedTarget, ScheduledHandle, ScheduledTask};

const DEFAULT_THREAD_NAME: &str = "fsm-delay-scheduler";

struct Entry<S, E> {
    seq: u64,
    task: ScheduledTask<S, E>,
}

// Reversed so that `BinaryHeap` pops the earliest due task first; `seq` keeps
// the order total for tasks sharing a due time.
impl<S: Debug, E: Debug> Ord for Entry<S, E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .task
            .due()
            .cmp(&self.task.due())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<S: Debug, E: Debug> PartialOrd for Entry<S, E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Debug, E: Debug> PartialEq for Entry<S, E> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<S: Debug, E: Debug> Eq for Entry<S, E> {}

struct Queue<S, E> {
    heap: BinaryHeap<Entry<S, E>>,
    next_seq: u64,
    /// Cancellations since the heap was last purged
    cancelled: usize,
    shutdown: bool,
}

impl<S: Debug, E: Debug> Queue<S, E> {
    /// Count one cancellation and take cancelled entries out of the heap once
    /// they make up more than half of it. The caller drops the returned
    /// entries after releasing the lock.
    fn note_cancelled(&mut self) -> Vec<Entry<S, E>> {
        self.cancelled += 1;
        if self.cancelled * 2 <= self.heap.len() {
            return Vec::new();
        }
        self.cancelled = 0;
        let (live, purged): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|entry| !entry.task.is_cancelled());
        self.heap = BinaryHeap::from(live);
        purged
    }
}

struct Shared<S, E> {
    queue: Mutex<Queue<S, E>>,
    wake: Condvar,
}

impl<S, E> Shared<S, E> {
    fn lock(&self) -> MutexGuard<'_, Queue<S, E>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ThreadScheduler`]
#[derive(Debug, Clone)]
pub struct ThreadSchedulerBuilder {
    thread_name: String,
}

impl ThreadSchedulerBuilder {
    /// Name of the worker thread
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Start the worker thread
    pub fn spawn<S, E>(self) -> io::Result<ThreadScheduler<S, E>>
    where
        S: Debug + Send + 'static,
        E: Debug + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                heap: BinaryHeap::new(),
                next_seq: 0,
                cancelled: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(self.thread_name)
            .spawn(move || run(&worker_shared))?;

        Ok(ThreadScheduler {
            shared,
            worker: Some(worker),
        })
    }
}

impl Default for ThreadSchedulerBuilder {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// A [`DelayScheduler`] backed by one dedicated thread.
///
/// The worker sleeps until the earliest task is due, then fires every due task
/// without holding the queue lock, so a firing task may schedule new ones.
/// Dropping the scheduler stops the worker and discards pending tasks.
pub struct ThreadScheduler<S, E> {
    shared: Arc<Shared<S, E>>,
    worker: Option<JoinHandle<()>>,
}

impl<S, E> ThreadScheduler<S, E>
where
    S: Debug + Send + 'static,
    E: Debug + Send + 'static,
{
    /// Start a scheduler with default settings
    pub fn new() -> io::Result<Self> {
        Self::builder().spawn()
    }

    /// Configure a scheduler before starting it
    pub fn builder() -> ThreadSchedulerBuilder {
        ThreadSchedulerBuilder::default()
    }

    /// Number of tasks waiting in the queue.
    ///
    /// Cancelled tasks are purged in batches, so up to half of the count may
    /// be tasks that will never fire.
    pub fn pending(&self) -> usize {
        self.shared.lock().heap.len()
    }
}

impl<S, E> DelayScheduler<S, E> for ThreadScheduler<S, E>
where
    S: Debug + Send + Sync + 'static,
    E: Debug + Send + Sync + 'static,
{
    fn schedule(
        &self,
        original_state: S,
        event: E,
        delay: Duration,
        target: Arc<dyn DelayedTarget<S, E>>,
    ) -> ScheduledHandle {
        let (task, handle) = ScheduledTask::new(original_state, event, delay, target);
        let mut queue = self.shared.lock();
        if queue.shutdown {
            warn!("Scheduler is shut down, dropping delayed event {:?}", task.event());
            handle.cancel();
            return handle;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Entry { seq, task });
        drop(queue);
        self.shared.wake.notify_one();

        let shared = Arc::downgrade(&self.shared);
        handle.on_cancel(move || {
            if let Some(shared) = shared.upgrade() {
                let purged = shared.lock().note_cancelled();
                drop(purged);
            }
        });
        handle
    }
}

impl<S, E> Drop for ThreadScheduler<S, E> {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            // The last handle can be released by a task firing on the worker.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
    }
}

fn run<S: Debug, E: Debug>(shared: &Shared<S, E>) {
    let mut queue = shared.lock();
    loop {
        if queue.shutdown {
            debug!(
                "Scheduler stopping, discarding {} pending delayed events",
                queue.heap.len()
            );
            let discarded = std::mem::take(&mut queue.heap);
            drop(queue);
            drop(discarded);
            return;
        }

        let now = Instant::now();
        match queue.heap.peek().map(|entry| entry.task.due()) {
            Some(due) if due <= now => {
                if let Some(entry) = queue.heap.pop() {
                    drop(queue);
                    entry.task.fire();
                    queue = shared.lock();
                }
            }
            Some(due) => {
                queue = shared
                    .wake
                    .wait_timeout(queue, due - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            None => {
                debug!("Waiting for next delayed event");
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}
