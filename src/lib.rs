//! # Delayed FSM
//!
//! A thread-safe finite state machine in Rust with ordered transition actions
//! and delayed follow-up events that cancel themselves once the machine moves on.
//!
//! ## Features
//!
//! - 🔗 **Transition Table**: Links keyed by `(state, event)`, checked at registration
//! - 🛡️ **Best-Effort Actions**: A failing action is logged, never aborts the transition
//! - ⏰ **Delayed Events**: Follow-up events fired only if the machine is still where it was
//! - 🧵 **Thread Safe**: One lock per machine, usable from any number of threads
//! - 🕰️ **Pluggable Timers**: A dedicated scheduler thread or the tokio timer
//! - 📊 **PlantUML Export**: Transition table as a state diagram
//!
//! ## Quick Start
//!
//! ```rust
//! use delayed_fsm::{Duration, FiniteStateMachine, Link, LinkBuilder, ThreadScheduler};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Door { Idle, Open, Locked }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum DoorEvent { Open, CloseAndLock, Unlock }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler: Arc<ThreadScheduler<Door, DoorEvent>> = Arc::new(ThreadScheduler::new()?);
//! let fsm = FiniteStateMachine::with_scheduler(Door::Idle, scheduler);
//!
//! fsm.link(Link::new(Door::Idle, DoorEvent::Open, Door::Open))?
//!     .link(Link::new(Door::Locked, DoorEvent::Unlock, Door::Open))?
//!     .link(
//!         LinkBuilder::new(Door::Open, DoorEvent::CloseAndLock, Door::Locked)
//!             .action(|| println!("click"))
//!             .delayed(DoorEvent::Unlock, Duration::from_millis(100)),
//!     )?;
//!
//! fsm.perform_event(DoorEvent::Open)?;
//! assert_eq!(fsm.perform_event(DoorEvent::CloseAndLock)?, Door::Locked);
//! // ~100ms later the machine unlocks itself and is back in `Door::Open`
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod builder;
mod error;
mod fsm;
mod link;
pub mod scheduler;

#[cfg(feature = "plantuml")]
mod plantuml;

pub use builder::LinkBuilder;
pub use error::{ActionFailure, BoxError, Error, Result};
pub use fsm::{FiniteStateMachine, FsmKey};
pub use link::{Action, Delayed, Fallible, Link};
pub use scheduler::{DelayScheduler, DelayedTarget, ScheduledHandle, ScheduledTask, ThreadScheduler};

#[cfg(feature = "tokio-integration")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-integration")))]
pub use scheduler::TokioScheduler;

#[cfg(feature = "tokio-integration")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-integration")))]
pub use tokio::time::Duration;

#[cfg(not(feature = "tokio-integration"))]
pub use std::time::Duration;

pub mod prelude {
    //! Prelude module for convenient imports
    pub use crate::{
        DelayScheduler, Error, FiniteStateMachine, Link, LinkBuilder, Result, ScheduledHandle,
        ThreadScheduler,
    };
    pub use std::time::Duration;
}
