//! A thread-safe finite state machine (FSM) driven by a table of [`Link`]s,
//! with optional delayed follow-up events.
//!
//! # Type Parameters
//! - `S`: State identifier type. Must implement `Hash`, `Eq`, `Clone`, `Debug`, `Send` and `Sync`.
//! - `E`: Event type. Same requirements as `S`.
//!
//! # Features
//! - Transition table keyed by `(state, event)`, validated as links are registered.
//! - Ordered, best-effort transition actions: a failing action is logged and
//!   never blocks the remaining actions or the state change.
//! - Delayed follow-up events driven by a [`DelayScheduler`], discarded when the
//!   machine has moved on by the time they fire.
//! - Optional PlantUML export of the transition table (`plantuml` feature).
//!
//! # Usage
//! 1. Create the machine with [`FiniteStateMachine::new`], or
//!    [`FiniteStateMachine::with_scheduler`] if any link has a delayed event.
//! 2. Register links with [`FiniteStateMachine::link`], delayed events' links first.
//! 3. Drive it with [`FiniteStateMachine::perform_event`] from any thread.
//!
//! # Concurrency
//! All registration and dispatch on one machine is serialized by a single
//! lock, held while actions run. Actions must therefore not call back into the
//! machine that is running them.
//!
//! # Errors
//! Registration fails with [`Error::DuplicateTransition`],
//! [`Error::UnknownDelayedEvent`] or [`Error::SchedulerNotConfigured`];
//! dispatch fails with [`Error::IllegalTransition`].

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::link::{run_guarded, Action, Delayed, Link};
use crate::scheduler::{DelayScheduler, DelayedTarget, ScheduledHandle};

/// Requirements for state and event identifiers
pub trait FsmKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> FsmKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

struct Transition<S, E> {
    target: S,
    actions: Vec<Arc<dyn Action>>,
    delayed: Option<Delayed<E>>,
}

struct ArmedTimer {
    ticket: u64,
    handle: ScheduledHandle,
}

struct Inner<S, E> {
    state: S,
    table: HashMap<S, HashMap<E, Transition<S, E>>>,
    timer: Option<ArmedTimer>,
    next_ticket: u64,
}

struct Shared<S, E> {
    inner: Mutex<Inner<S, E>>,
    scheduler: Option<Arc<dyn DelayScheduler<S, E>>>,
}

/// Finite state machine handle. Clones share the same machine.
pub struct FiniteStateMachine<S, E> {
    shared: Arc<Shared<S, E>>,
}

impl<S, E> Clone for FiniteStateMachine<S, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: FsmKey, E: FsmKey> FiniteStateMachine<S, E> {
    /// Create a machine in `initial` state without delayed-event support
    pub fn new(initial: S) -> Self {
        Self::build(initial, None)
    }

    /// Create a machine in `initial` state whose delayed links use `scheduler`
    pub fn with_scheduler(initial: S, scheduler: Arc<dyn DelayScheduler<S, E>>) -> Self {
        Self::build(initial, Some(scheduler))
    }

    fn build(initial: S, scheduler: Option<Arc<dyn DelayScheduler<S, E>>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: initial,
                    table: HashMap::new(),
                    timer: None,
                    next_ticket: 0,
                }),
                scheduler,
            }),
        }
    }

    /// Register a link. Returns `self` so registrations can be chained with `?`.
    ///
    /// A rejected link leaves the table untouched.
    pub fn link(&self, link: impl Into<Link<S, E>>) -> Result<&Self, S, E> {
        let link = link.into();
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        if let Some(existing) = inner
            .table
            .get(&link.source)
            .and_then(|events| events.get(&link.event))
        {
            return Err(Error::DuplicateTransition {
                existing_target: existing.target.clone(),
                state: link.source,
                event: link.event,
            });
        }

        if let Some(delayed) = &link.delayed {
            if self.shared.scheduler.is_none() {
                return Err(Error::SchedulerNotConfigured {
                    state: link.source,
                    event: link.event,
                });
            }
            let self_loop = link.source == link.target && link.event == *delayed.event();
            let linked = self_loop
                || inner
                    .table
                    .get(&link.target)
                    .is_some_and(|events| events.contains_key(delayed.event()));
            if !linked {
                return Err(Error::UnknownDelayedEvent {
                    event: delayed.event().clone(),
                    state: link.target,
                });
            }
        }

        debug!(
            "Linking {:?} --{:?}--> {:?} ({} actions, delayed: {:?})",
            link.source,
            link.event,
            link.target,
            link.actions.len(),
            link.delayed
        );
        let Link {
            source,
            target,
            event,
            actions,
            delayed,
        } = link;
        inner.table.entry(source).or_default().insert(
            event,
            Transition {
                target,
                actions,
                delayed,
            },
        );
        Ok(self)
    }

    /// Apply `event` to the current state and return the new state.
    ///
    /// Cancels any pending delayed event, runs the link's actions in order,
    /// moves to the target state and arms the link's delayed event, if any.
    pub fn perform_event(&self, event: E) -> Result<S, S, E> {
        let mut inner = self.shared.lock();
        self.shared.dispatch(&mut inner, event)
    }

    /// Get the current state
    pub fn state(&self) -> S {
        self.shared.lock().state.clone()
    }

    /// Events linked from `state`, in no particular order
    pub fn legal_events(&self, state: &S) -> Vec<E> {
        legal_events(&self.shared.lock().table, state)
    }

    /// Target of the link registered for `(state, event)`
    pub fn target(&self, state: &S, event: &E) -> Option<S> {
        self.shared
            .lock()
            .table
            .get(state)
            .and_then(|events| events.get(event))
            .map(|transition| transition.target.clone())
    }

    /// Whether a delayed event is armed and not cancelled
    pub fn has_pending_delay(&self) -> bool {
        self.shared
            .lock()
            .timer
            .as_ref()
            .is_some_and(|armed| !armed.handle.is_cancelled())
    }

    /// Export the transition table as a PlantUML state diagram
    #[cfg(feature = "plantuml")]
    #[cfg_attr(docsrs, doc(cfg(feature = "plantuml")))]
    pub fn export_plantuml(&self) -> String {
        let inner = self.shared.lock();
        let mut rows: Vec<crate::plantuml::Row> = inner
            .table
            .iter()
            .flat_map(|(source, events)| {
                events.iter().map(move |(event, transition)| crate::plantuml::Row {
                    source: format!("{:?}", source),
                    event: format!("{:?}", event),
                    target: format!("{:?}", transition.target),
                    delayed: transition
                        .delayed
                        .as_ref()
                        .map(|d| (format!("{:?}", d.event()), d.duration())),
                })
            })
            .collect();
        rows.sort();
        crate::plantuml::generate_plantuml(&rows, &format!("{:?}", inner.state))
    }

    /// Stub for export_plantuml when feature is disabled
    #[cfg(not(feature = "plantuml"))]
    pub fn export_plantuml(&self) -> String {
        String::from("PlantUML export not available (requires 'plantuml' feature)")
    }
}

impl<S: FsmKey, E: FsmKey> Debug for FiniteStateMachine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("FiniteStateMachine")
            .field("state", &inner.state)
            .field("links", &inner.table.values().map(HashMap::len).sum::<usize>())
            .field("pending_delay", &inner.timer.is_some())
            .field("scheduler", &self.shared.scheduler.is_some())
            .finish()
    }
}

impl<S, E> Shared<S, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<S, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: FsmKey, E: FsmKey> Shared<S, E> {
    /// The single dispatch path for callers and delayed events alike
    fn dispatch(self: &Arc<Self>, inner: &mut Inner<S, E>, event: E) -> Result<S, S, E> {
        let Inner {
            state,
            table,
            timer,
            next_ticket,
        } = inner;

        debug!("FSM handling event {:?} in state {:?}", event, state);

        let Some(transition) = table.get(&*state).and_then(|events| events.get(&event)) else {
            return Err(Error::IllegalTransition {
                state: state.clone(),
                legal_events: legal_events(table, state),
                event,
            });
        };

        if let Some(armed) = timer.take() {
            debug!("Cancelling pending delayed event armed in state {:?}", state);
            armed.handle.cancel();
        }

        for (index, action) in transition.actions.iter().enumerate() {
            if let Err(failure) = run_guarded(action.as_ref()) {
                error!(
                    action = index,
                    "Action failed during {:?} in state {:?}, continuing: {}", event, state, failure
                );
            }
        }

        let from = std::mem::replace(state, transition.target.clone());
        debug!("FSM transitioned from {:?} to {:?}", from, state);

        if let (Some(delayed), Some(scheduler)) = (&transition.delayed, &self.scheduler) {
            *next_ticket += 1;
            let ticket = *next_ticket;
            let target: Arc<dyn DelayedTarget<S, E>> = Arc::new(DelayedDispatch {
                machine: Arc::downgrade(self),
                ticket,
            });
            debug!(
                "Arming delayed event {:?} after {:?} in state {:?}",
                delayed.event(),
                delayed.duration(),
                state
            );
            let handle = scheduler.schedule(
                state.clone(),
                delayed.event().clone(),
                delayed.duration(),
                target,
            );
            *timer = Some(ArmedTimer { ticket, handle });
        }

        Ok(state.clone())
    }
}

impl<S, E> Drop for Shared<S, E> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(armed) = inner.timer.take() {
            armed.handle.cancel();
        }
    }
}

fn legal_events<S: FsmKey, E: FsmKey>(
    table: &HashMap<S, HashMap<E, Transition<S, E>>>,
    state: &S,
) -> Vec<E> {
    table
        .get(state)
        .map(|events| events.keys().cloned().collect())
        .unwrap_or_default()
}

/// Re-entry point handed to the scheduler for one armed delayed event
struct DelayedDispatch<S, E> {
    machine: Weak<Shared<S, E>>,
    ticket: u64,
}

impl<S: FsmKey, E: FsmKey> DelayedTarget<S, E> for DelayedDispatch<S, E> {
    fn fire(&self, original_state: &S, event: E) -> Result<Option<S>, S, E> {
        let Some(shared) = self.machine.upgrade() else {
            debug!("Delayed event {:?} outlived its state machine", event);
            return Ok(None);
        };
        let mut inner = shared.lock();

        let superseded = inner
            .timer
            .as_ref()
            .map_or(true, |armed| armed.ticket != self.ticket);
        if superseded {
            debug!(
                ticket = self.ticket,
                "Delayed event {:?} armed in state {:?} was superseded", event, original_state
            );
            return Ok(None);
        }
        if inner.state != *original_state {
            debug!(
                "Delayed event {:?} ignored, FSM left state {:?} for {:?}",
                event, original_state, inner.state
            );
            return Ok(None);
        }

        inner.timer = None;
        shared.dispatch(&mut inner, event).map(Some)
    }
}
