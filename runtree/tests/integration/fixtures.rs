// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use runtree::{
    events::SessionEvent,
    ingest::{EventIngestor, IngestOptions},
    listener::ListenerSet,
    session::{ProgressState, TestResult, TestRunSession},
};

/// Events for a run with one suite holding two cases, one of which errors.
pub(crate) const TWO_CASE_RUN: &str = r##"
{"event":"session-started","expected-count":2,"name":"nightly"}
{"event":"suite-declared","id":"suite","name":"Calculator"}
{"event":"test-declared","id":"case1","class-name":"calc.Calculator","method-name":"adds","parent":"suite"}
{"event":"test-declared","id":"case2","class-name":"calc.Calculator","method-name":"divides","parent":"suite"}
{"event":"test-started","id":"case1"}
{"event":"test-ended","id":"case1","elapsed":0.125}
{"event":"test-started","id":"case2"}
{"event":"test-failed","id":"case2","failure":{"kind":"error","exception-type":"ArithmeticError","trace":"division by zero"}}
{"event":"test-ended","id":"case2","elapsed":0.5}
{"event":"session-finished","elapsed":1.0}
"##;

pub(crate) fn parse_events(input: &str) -> Vec<SessionEvent> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| SessionEvent::from_json_line(line).expect("fixture events are valid"))
        .collect()
}

pub(crate) fn ingestor_with(listeners: ListenerSet) -> EventIngestor {
    EventIngestor::new("run", listeners, IngestOptions::default())
}

/// Applies every event in `input`, panicking if any is rejected.
pub(crate) fn ingest_all(input: &str) -> EventIngestor {
    let mut ingestor = ingestor_with(ListenerSet::new());
    for event in parse_events(input) {
        ingestor.apply(event).expect("event is accepted");
    }
    ingestor
}

pub(crate) fn state(session: &TestRunSession, id: &str) -> (ProgressState, TestResult) {
    let element = session
        .find(id)
        .unwrap_or_else(|| panic!("element `{id}` exists"));
    (element.progress(), element.result())
}

pub(crate) fn child_names(session: &TestRunSession, id: &str) -> Vec<String> {
    let index = session
        .find_index(id)
        .unwrap_or_else(|| panic!("element `{id}` exists"));
    session
        .children(index)
        .map(|element| element.display_name().to_owned())
        .collect()
}
