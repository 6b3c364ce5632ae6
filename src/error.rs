//! Error types for the state machine

use thiserror::Error;

/// Result type alias for state machine operations
pub type Result<T, S, E> = std::result::Result<T, Error<S, E>>;

/// Boxed error returned by fallible actions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring or driving a state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<S, E> {
    /// A link for the same source state and event is already registered
    #[error("Event {event:?} in state {state:?} is already linked to state {existing_target:?}")]
    DuplicateTransition {
        /// Source state of the rejected link
        state: S,
        /// Event of the rejected link
        event: E,
        /// Target of the link that is already registered
        existing_target: S,
    },

    /// The delayed follow-up event is not linked for the link's target state
    #[error("Delayed event {event:?} is not a legal event for target state {state:?}")]
    UnknownDelayedEvent {
        /// Target state of the rejected link
        state: S,
        /// The delayed follow-up event
        event: E,
    },

    /// A delayed link was registered on a machine built without a scheduler
    #[error("Link from state {state:?} on event {event:?} has a delayed event but no scheduler is configured")]
    SchedulerNotConfigured {
        /// Source state of the rejected link
        state: S,
        /// Event of the rejected link
        event: E,
    },

    /// The event has no link from the current state
    #[error("{event:?} is not a legal event for state {state:?}, legal events for this state are: {legal_events:?}")]
    IllegalTransition {
        /// State the machine was in
        state: S,
        /// The rejected event
        event: E,
        /// Events linked from `state`
        legal_events: Vec<E>,
    },
}

/// Why a single transition action failed
#[derive(Error, Debug)]
pub enum ActionFailure {
    /// The action returned an error
    #[error("action returned an error: {0}")]
    Returned(#[source] BoxError),

    /// The action panicked
    #[error("action panicked: {0}")]
    Panicked(String),
}

impl ActionFailure {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        ActionFailure::Panicked(panic_message(payload))
    }
}

/// Best-effort extraction of a panic payload's message
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_message_lists_legal_events() {
        let err: Error<&str, &str> = Error::IllegalTransition {
            state: "IDLE",
            event: "UNLOCK",
            legal_events: vec!["OPEN"],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"UNLOCK\" is not a legal event for state \"IDLE\""));
        assert!(msg.contains("[\"OPEN\"]"));
    }

    #[test]
    fn duplicate_message_names_existing_target() {
        let err: Error<&str, &str> = Error::DuplicateTransition {
            state: "OPEN",
            event: "CLOSE",
            existing_target: "CLOSED",
        };
        assert_eq!(
            err.to_string(),
            "Event \"CLOSE\" in state \"OPEN\" is already linked to state \"CLOSED\""
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        let failure = ActionFailure::from_panic(Box::new("boom"));
        assert_eq!(failure.to_string(), "action panicked: boom");

        let failure = ActionFailure::from_panic(Box::new(String::from("bang")));
        assert_eq!(failure.to_string(), "action panicked: bang");

        let failure = ActionFailure::from_panic(Box::new(42_u8));
        assert_eq!(failure.to_string(), "action panicked: non-string panic payload");
    }
}
