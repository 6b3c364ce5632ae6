//! Delayed-event scheduling.
//!
//! A [`DelayScheduler`] accepts requests from the state machine and, once the
//! delay elapses, drives the request's [`DelayedTarget`]. The target decides
//! whether the task is stale; the scheduler only has to make sure a single
//! failing task never takes the timer down with it.

use std::fmt::{self, Debug};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{panic_message, Result};

mod thread;
#[cfg(feature = "tokio-integration")]
mod tokio_timer;

pub use self::thread::{ThreadScheduler, ThreadSchedulerBuilder};
#[cfg(feature = "tokio-integration")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-integration")))]
pub use self::tokio_timer::TokioScheduler;

/// Something a delayed event can be fired into.
///
/// [`FiniteStateMachine`](crate::FiniteStateMachine) hands the scheduler one of
/// these per request.
pub trait DelayedTarget<S, E>: Send + Sync {
    /// Perform `event` if the target is still in `original_state`.
    ///
    /// Returns `Ok(None)` when the task is stale and was discarded.
    fn fire(&self, original_state: &S, event: E) -> Result<Option<S>, S, E>;
}

/// Timer facility used by the state machine for delayed follow-up events
pub trait DelayScheduler<S, E>: Send + Sync {
    /// Fire `event` into `target` no earlier than `delay` from now, unless the
    /// returned handle is cancelled first.
    fn schedule(
        &self,
        original_state: S,
        event: E,
        delay: Duration,
        target: Arc<dyn DelayedTarget<S, E>>,
    ) -> ScheduledHandle;
}

type Canceller = Box<dyn FnOnce() + Send>;

struct HandleInner {
    cancelled: AtomicBool,
    canceller: Mutex<Option<Canceller>>,
}

/// Cancellation token for one scheduled task.
///
/// Cancelling is best effort: a task that already started firing is not
/// interrupted.
#[derive(Clone)]
pub struct ScheduledHandle {
    inner: Arc<HandleInner>,
}

impl ScheduledHandle {
    /// A fresh, uncancelled handle
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cancelled: AtomicBool::new(false),
                canceller: Mutex::new(None),
            }),
        }
    }

    /// Prevent the task from firing if it has not fired yet
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let canceller = self
            .inner
            .canceller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(canceller) = canceller {
            canceller();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register extra work to run on cancellation, such as aborting a timer
    /// task. Runs immediately if the handle is already cancelled.
    pub fn on_cancel<F>(&self, canceller: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self
            .inner
            .canceller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            drop(slot);
            canceller();
        } else {
            *slot = Some(Box::new(canceller));
        }
    }
}

impl Default for ScheduledHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A delayed event waiting for its due time
pub struct ScheduledTask<S, E> {
    target: Arc<dyn DelayedTarget<S, E>>,
    original_state: S,
    event: E,
    due: Instant,
    handle: ScheduledHandle,
}

impl<S, E> ScheduledTask<S, E>
where
    S: Debug,
    E: Debug,
{
    /// Build a task due `delay` from now, returning it with its handle
    pub fn new(
        original_state: S,
        event: E,
        delay: Duration,
        target: Arc<dyn DelayedTarget<S, E>>,
    ) -> (Self, ScheduledHandle) {
        let handle = ScheduledHandle::new();
        let task = Self {
            target,
            original_state,
            event,
            due: Instant::now() + delay,
            handle: handle.clone(),
        };
        (task, handle)
    }

    /// When the task becomes due
    pub fn due(&self) -> Instant {
        self.due
    }

    /// State the target must still be in for the event to be performed
    pub fn original_state(&self) -> &S {
        &self.original_state
    }

    /// The delayed event
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Whether the task was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Fire the task into its target. Never panics and never returns an error;
    /// every outcome other than success is logged and dropped.
    pub fn fire(self) {
        let Self {
            target,
            original_state,
            event,
            handle,
            ..
        } = self;

        if handle.is_cancelled() {
            debug!(
                "Delayed event {:?} in state {:?} was cancelled",
                event, original_state
            );
            return;
        }

        debug!(
            "Performing delayed event {:?} in state {:?}",
            event, original_state
        );
        let label = format!("{:?}", event);
        match catch_unwind(AssertUnwindSafe(|| target.fire(&original_state, event))) {
            Ok(Ok(Some(state))) => {
                debug!(new_state = ?state, "Delayed event {} performed", label);
            }
            Ok(Ok(None)) => {
                debug!(
                    "Delayed event {} in state {:?} was stale and discarded",
                    label, original_state
                );
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Delayed event {} in state {:?} failed", label, original_state);
            }
            Err(payload) => {
                error!(
                    panic = %panic_message(payload),
                    "Delayed event {} in state {:?} panicked",
                    label,
                    original_state
                );
            }
        }
    }
}

impl<S: Debug, E: Debug> Debug for ScheduledTask<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("original_state", &self.original_state)
            .field("event", &self.event)
            .field("due", &self.due)
            .field("cancelled", &self.handle.is_cancelled())
            .finish()
    }
}
