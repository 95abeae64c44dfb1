// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use runtree::{
    prioritize::{prioritize, prioritize_failures_first},
    session::{ElementId, NewElement, TestRunSession},
};

fn add_suite(session: &mut TestRunSession, parent: &str, id: &str, tests: &[&str]) {
    session
        .add_test(parent, NewElement::suite(id, id.to_uppercase()))
        .unwrap();
    for test in tests {
        session
            .add_test(id, NewElement::case(test.to_lowercase(), id.to_uppercase(), *test))
            .unwrap();
    }
}

fn two_suites(wrap_second: bool) -> TestRunSession {
    let mut session = TestRunSession::new("plan");
    add_suite(&mut session, ElementId::SESSION, "s1", &["A", "B", "C"]);
    if wrap_second {
        session
            .add_test(ElementId::SESSION, NewElement::wrapper("w", "Decorated"))
            .unwrap();
        add_suite(&mut session, "w", "s2", &["D", "E", "F"]);
    } else {
        add_suite(&mut session, ElementId::SESSION, "s2", &["D", "E", "F"]);
    }
    session
}

#[test]
fn single_suite() {
    let mut session = TestRunSession::new("plan");
    add_suite(&mut session, ElementId::SESSION, "s", &["D", "E", "F"]);

    let prioritized = prioritize(&session, &["S::F"]);
    assert_eq!(child_names(&prioritized, "s"), ["F", "D", "E"]);
}

#[test]
fn suite_with_priority_test_moves_first() {
    let session = two_suites(false);

    let prioritized = prioritize(&session, &["S2::F"]);
    assert_eq!(child_names(&prioritized, ElementId::SESSION), ["S2", "S1"]);
    assert_eq!(child_names(&prioritized, "s2"), ["F", "D", "E"]);
    assert_eq!(child_names(&prioritized, "s1"), ["A", "B", "C"]);
    prioritized.check_consistency().unwrap();
}

#[test]
fn wrappers_are_transparent() {
    let session = two_suites(true);

    let prioritized = prioritize(&session, &["S2::F"]);
    assert_eq!(
        child_names(&prioritized, ElementId::SESSION),
        ["Decorated", "S1"]
    );
    assert_eq!(child_names(&prioritized, "w"), ["S2"]);
    assert_eq!(child_names(&prioritized, "s2"), ["F", "D", "E"]);
    assert_eq!(child_names(&prioritized, "s1"), ["A", "B", "C"]);
}

#[test]
fn empty_priority_list_is_identity() {
    let session = two_suites(true);
    let prioritized = prioritize::<&str>(&session, &[]);

    let ids = |session: &TestRunSession| -> Vec<ElementId> {
        session.iter().map(|element| element.id().clone()).collect()
    };
    assert_eq!(ids(&prioritized), ids(&session));

    // Names that match nothing are also the identity.
    let prioritized = prioritize(&session, &["Nope::nothing"]);
    assert_eq!(ids(&prioritized), ids(&session));
}

#[test]
fn previous_failures_run_first() {
    let previous = ingest_all(
        r##"
        {"event":"session-started","expected-count":6}
        {"event":"suite-declared","id":"s1","name":"S1"}
        {"event":"test-declared","id":"b","class-name":"S1","method-name":"B","parent":"s1"}
        {"event":"suite-declared","id":"s2","name":"S2"}
        {"event":"test-declared","id":"e","class-name":"S2","method-name":"E","parent":"s2"}
        {"event":"test-declared","id":"f","class-name":"S2","method-name":"F","parent":"s2"}
        {"event":"test-failed","id":"f","failure":{"kind":"failure"}}
        {"event":"test-ended","id":"e"}
        {"event":"test-failed","id":"b","failure":{"kind":"error"}}
        {"event":"session-finished"}
        "##,
    )
    .into_session();

    // The qualified names are what connect the two sessions, not the IDs.
    let plan = two_suites(false);
    let prioritized = prioritize_failures_first(&plan, &previous);
    assert_eq!(child_names(&prioritized, ElementId::SESSION), ["S1", "S2"]);
    assert_eq!(child_names(&prioritized, "s1"), ["B", "A", "C"]);
    assert_eq!(child_names(&prioritized, "s2"), ["F", "D", "E"]);
}
