//! Builder pattern implementation for links

use crate::error::BoxError;
use crate::link::{Action, Delayed, Fallible, Link};
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing [`Link`] values
pub struct LinkBuilder<S, E> {
    link: Link<S, E>,
}

impl<S, E> LinkBuilder<S, E> {
    /// Start a link: `event` in `source` moves the machine to `target`
    pub fn new(source: S, event: E, target: S) -> Self {
        Self {
            link: Link::new(source, event, target),
        }
    }

    /// Append an action; actions run in the order they were added
    pub fn action<A>(mut self, action: A) -> Self
    where
        A: Action + 'static,
    {
        self.link.actions.push(Arc::new(action));
        self
    }

    /// Append an action that reports failure through its return value
    pub fn try_action<F, Err>(self, action: F) -> Self
    where
        F: Fn() -> Result<(), Err> + Send + Sync + 'static,
        Err: Into<BoxError> + 'static,
    {
        self.action(Fallible(action))
    }

    /// Append an already shared action
    pub fn shared_action(mut self, action: Arc<dyn Action>) -> Self {
        self.link.actions.push(action);
        self
    }

    /// Submit `event` automatically after `duration` if the machine is still
    /// in the target state by then
    pub fn delayed(mut self, event: E, duration: Duration) -> Self {
        self.link.delayed = Some(Delayed::new(event, duration));
        self
    }

    /// Build the link
    pub fn build(self) -> Link<S, E> {
        self.link
    }
}

impl<S, E> From<LinkBuilder<S, E>> for Link<S, E> {
    fn from(builder: LinkBuilder<S, E>) -> Self {
        builder.build()
    }
}
