//! Property-based tests for the transition table.
//!
//! These tests use proptest to check that registration and dispatch agree
//! with a plain map model of the table.

use delayed_fsm::{Duration, Error, FiniteStateMachine, Link, LinkBuilder};
use proptest::prelude::*;
use std::collections::HashMap;

const STATES: u8 = 6;
const EVENTS: u8 = 4;

prop_compose! {
    fn arbitrary_link()(source in 0..STATES, event in 0..EVENTS, target in 0..STATES) -> (u8, u8, u8) {
        (source, event, target)
    }
}

/// Registers every link whose key is new and returns the model of the table.
fn build(fsm: &FiniteStateMachine<u8, u8>, links: &[(u8, u8, u8)]) -> HashMap<(u8, u8), u8> {
    let mut model = HashMap::new();
    for &(source, event, target) in links {
        if model.contains_key(&(source, event)) {
            continue;
        }
        fsm.link(Link::new(source, event, target)).unwrap();
        model.insert((source, event), target);
    }
    model
}

proptest! {
    #[test]
    fn distinct_keys_always_link(links in prop::collection::vec(arbitrary_link(), 0..40)) {
        let fsm = FiniteStateMachine::new(0u8);
        let model = build(&fsm, &links);

        for source in 0..STATES {
            for event in 0..EVENTS {
                prop_assert_eq!(fsm.target(&source, &event), model.get(&(source, event)).copied());
            }
        }
    }

    #[test]
    fn duplicate_key_is_rejected_and_table_unchanged(
        links in prop::collection::vec(arbitrary_link(), 1..40),
        pick in any::<prop::sample::Index>(),
        new_target in 0..STATES,
    ) {
        let fsm = FiniteStateMachine::new(0u8);
        let model = build(&fsm, &links);
        let (source, event, _) = links[pick.index(links.len())];
        let existing = model[&(source, event)];

        let err = fsm.link(Link::new(source, event, new_target)).unwrap_err();
        prop_assert_eq!(
            err,
            Error::DuplicateTransition { state: source, event, existing_target: existing }
        );
        prop_assert_eq!(fsm.target(&source, &event), Some(existing));
        prop_assert_eq!(fsm.state(), 0);
    }

    #[test]
    fn delayed_link_without_scheduler_is_rejected(
        links in prop::collection::vec(arbitrary_link(), 0..20),
        (source, event, target) in arbitrary_link(),
        delayed_event in 0..EVENTS,
    ) {
        let fsm = FiniteStateMachine::new(0u8);
        let model = build(&fsm, &links);
        prop_assume!(!model.contains_key(&(source, event)));

        let err = fsm
            .link(
                LinkBuilder::new(source, event, target)
                    .delayed(delayed_event, Duration::from_millis(10)),
            )
            .unwrap_err();
        prop_assert_eq!(err, Error::SchedulerNotConfigured { state: source, event });
        prop_assert_eq!(fsm.target(&source, &event), None);
    }

    #[test]
    fn dispatch_follows_the_table(
        links in prop::collection::vec(arbitrary_link(), 0..40),
        events in prop::collection::vec(0..EVENTS, 0..30),
    ) {
        let fsm = FiniteStateMachine::new(0u8);
        let model = build(&fsm, &links);
        let mut current = 0u8;

        for event in events {
            match model.get(&(current, event)) {
                Some(&target) => {
                    prop_assert_eq!(fsm.perform_event(event), Ok(target));
                    current = target;
                }
                None => {
                    let is_illegal = matches!(
                        fsm.perform_event(event),
                        Err(Error::IllegalTransition { state, event: rejected, .. })
                            if state == current && rejected == event
                    );
                    prop_assert!(is_illegal);
                }
            }
            prop_assert_eq!(fsm.state(), current);
        }
    }

    #[test]
    fn legal_events_match_the_table(links in prop::collection::vec(arbitrary_link(), 0..40)) {
        let fsm = FiniteStateMachine::new(0u8);
        let model = build(&fsm, &links);

        for source in 0..STATES {
            let mut legal = fsm.legal_events(&source);
            legal.sort_unstable();
            let mut expected: Vec<u8> = model
                .keys()
                .filter(|(state, _)| *state == source)
                .map(|(_, event)| *event)
                .collect();
            expected.sort_unstable();
            prop_assert_eq!(legal, expected);
        }
    }
}
