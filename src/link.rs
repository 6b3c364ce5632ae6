//! Transition definitions and the action abstraction

use std::fmt::{self, Debug};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ActionFailure, BoxError};

/// A side effect run while a transition is taken.
///
/// Every `Fn() + Send + Sync` closure is an action; a closure that panics is
/// treated as a failed action. Wrap closures returning `Result` in [`Fallible`]
/// to report failure without panicking.
pub trait Action: Send + Sync {
    /// Run the side effect.
    fn run(&self) -> std::result::Result<(), BoxError>;
}

impl<F> Action for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) -> std::result::Result<(), BoxError> {
        self();
        Ok(())
    }
}

/// Adapter turning a `Fn() -> Result<(), Err>` closure into an [`Action`]
pub struct Fallible<F>(pub F);

impl<F, Err> Action for Fallible<F>
where
    F: Fn() -> std::result::Result<(), Err> + Send + Sync,
    Err: Into<BoxError>,
{
    fn run(&self) -> std::result::Result<(), BoxError> {
        (self.0)().map_err(Into::into)
    }
}

/// Run an action, converting both error returns and panics into [`ActionFailure`]
pub(crate) fn run_guarded(action: &dyn Action) -> std::result::Result<(), ActionFailure> {
    match catch_unwind(AssertUnwindSafe(|| action.run())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ActionFailure::Returned(err)),
        Err(payload) => Err(ActionFailure::from_panic(payload)),
    }
}

/// A follow-up event submitted automatically after `duration`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delayed<E> {
    event: E,
    duration: Duration,
}

impl<E> Delayed<E> {
    /// Create a delayed follow-up
    pub fn new(event: E, duration: Duration) -> Self {
        Self { event, duration }
    }

    /// The event to submit
    pub fn event(&self) -> &E {
        &self.event
    }

    /// How long to wait before submitting it
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// An immutable transition definition.
///
/// While the machine is in `source`, `event` moves it to `target`, running
/// `actions` in order. If `delayed` is present, taking the link arms a timer
/// that submits the delayed event once its duration elapses, provided the
/// machine is still in `target` by then.
#[derive(Clone)]
pub struct Link<S, E> {
    pub(crate) source: S,
    pub(crate) target: S,
    pub(crate) event: E,
    pub(crate) actions: Vec<Arc<dyn Action>>,
    pub(crate) delayed: Option<Delayed<E>>,
}

impl<S, E> Link<S, E> {
    /// A link with no actions and no delayed follow-up
    pub fn new(source: S, event: E, target: S) -> Self {
        Self {
            source,
            target,
            event,
            actions: Vec::new(),
            delayed: None,
        }
    }

    /// State the machine must be in for this link to apply
    pub fn source(&self) -> &S {
        &self.source
    }

    /// State the machine moves to
    pub fn target(&self) -> &S {
        &self.target
    }

    /// Event that triggers the link
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Actions run, in order, when the link is taken
    pub fn actions(&self) -> &[Arc<dyn Action>] {
        &self.actions
    }

    /// Optional delayed follow-up armed when the link is taken
    pub fn delayed(&self) -> Option<&Delayed<E>> {
        self.delayed.as_ref()
    }
}

impl<S: Debug, E: Debug> Debug for Link<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("event", &self.event)
            .field("actions", &self.actions.len())
            .field("delayed", &self.delayed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct SensorOffline;

    impl fmt::Display for SensorOffline {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sensor offline")
        }
    }

    impl std::error::Error for SensorOffline {}

    #[test]
    fn closures_are_actions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action: Arc<dyn Action> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(run_guarded(action.as_ref()).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fallible_errors_are_reported() {
        let action = Fallible(|| Err::<(), _>(SensorOffline));
        match run_guarded(&action) {
            Err(ActionFailure::Returned(err)) => assert_eq!(err.to_string(), "sensor offline"),
            other => panic!("expected returned error, got {:?}", other),
        }
    }

    #[test]
    fn panics_are_caught() {
        let action = || panic!("write failed");
        match run_guarded(&action) {
            Err(ActionFailure::Panicked(msg)) => assert_eq!(msg, "write failed"),
            other => panic!("expected panic failure, got {:?}", other),
        }
    }

    #[test]
    fn bare_link_has_no_extras() {
        let link = Link::new("IDLE", "OPEN", "OPEN");
        assert_eq!(*link.source(), "IDLE");
        assert_eq!(*link.target(), "OPEN");
        assert!(link.actions().is_empty());
        assert!(link.delayed().is_none());
        assert!(format!("{:?}", link).contains("actions: 0"));
    }
}
