//! A door that locks on close and unlocks itself after a while.
//!
//! Run with `cargo run --example door_lock --features plantuml`.

use delayed_fsm::prelude::*;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Door {
    Idle,
    Open,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DoorEvent {
    Open,
    CloseAndLock,
    Unlock,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_names(true)
        .init();

    let scheduler = ThreadScheduler::<Door, DoorEvent>::builder()
        .thread_name("door-timer")
        .spawn()?;
    let fsm = FiniteStateMachine::with_scheduler(Door::Idle, Arc::new(scheduler));

    fsm.link(
        LinkBuilder::new(Door::Idle, DoorEvent::Open, Door::Open)
            .action(|| println!("Door swings open")),
    )?
    .link(
        LinkBuilder::new(Door::Locked, DoorEvent::Unlock, Door::Open)
            .action(|| println!("Bolt retracts")),
    )?
    .link(
        LinkBuilder::new(Door::Open, DoorEvent::CloseAndLock, Door::Locked)
            .action(|| println!("Door closes"))
            .action(|| println!("Bolt slides in"))
            .delayed(DoorEvent::Unlock, Duration::from_millis(500)),
    )?;

    println!("{}", fsm.export_plantuml());

    fsm.perform_event(DoorEvent::Open)?;
    fsm.perform_event(DoorEvent::CloseAndLock)?;
    println!("State: {:?}, unlock pending: {}", fsm.state(), fsm.has_pending_delay());

    if let Err(e) = fsm.perform_event(DoorEvent::Open) {
        println!("Rejected: {}", e);
    }

    thread::sleep(Duration::from_millis(700));
    println!("State: {:?}, unlock pending: {}", fsm.state(), fsm.has_pending_delay());

    Ok(())
}
