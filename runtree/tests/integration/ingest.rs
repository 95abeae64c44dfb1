// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use runtree::{
    errors::{IngestError, SwapError},
    events::{RerunStatus, SessionEvent},
    ingest::{read_event_stream, spawn_ingestor},
    listener::{FlatLogAdapter, FlatLogEvent, ListenerSet, SessionListener},
    session::{
        ElementId, FailureKind, ProgressState, RunCounters, TerminalCause, TestCaseElement,
        TestResult, TestRunSession,
    },
    swap::SwapStore,
};
use std::sync::{Arc, Mutex};

#[test]
fn two_case_run_rolls_up() {
    let ingestor = ingest_all(TWO_CASE_RUN);
    let session = ingestor.session();

    assert_eq!(session.name(), "nightly");
    assert_eq!(
        state(session, "case1"),
        (ProgressState::Completed, TestResult::Ok)
    );
    assert_eq!(
        state(session, "case2"),
        (ProgressState::Completed, TestResult::Error)
    );
    assert_eq!(
        state(session, "suite"),
        (ProgressState::Completed, TestResult::Error)
    );
    assert_eq!(
        (session.progress(), session.result()),
        (ProgressState::Completed, TestResult::Error)
    );
    assert_eq!(session.terminal_cause(), Some(TerminalCause::Finished));
    assert_eq!(
        session.counters(),
        RunCounters {
            started: 2,
            total: 2,
            failures: 0,
            errors: 1,
            ignored: 0,
        }
    );

    let case2 = session.find("case2").unwrap().as_case().unwrap();
    let failure = case2.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Error);
    assert_eq!(failure.exception_type.as_deref(), Some("ArithmeticError"));
    assert_eq!(case2.qualified_name(), "calc.Calculator::divides");
    assert_eq!(
        session.find("case1").unwrap().elapsed(),
        Some(std::time::Duration::from_millis(125))
    );
    session.check_consistency().unwrap();
}

#[test]
fn session_is_running_until_terminal_event() {
    let events = parse_events(TWO_CASE_RUN);
    let (last, rest) = events.split_last().unwrap();

    let mut ingestor = ingestor_with(ListenerSet::new());
    for event in rest.iter().cloned() {
        ingestor.apply(event).unwrap();
    }
    // Every test has completed, but more may still be reported.
    assert_eq!(
        (ingestor.session().progress(), ingestor.session().result()),
        (ProgressState::Running, TestResult::Undefined)
    );
    assert!(ingestor.session().is_running());

    ingestor.apply(last.clone()).unwrap();
    assert_eq!(ingestor.session().progress(), ProgressState::Completed);
    assert!(!ingestor.session().is_running());
}

#[test]
fn stopped_session_keeps_unfinished_tests() {
    let ingestor = ingest_all(
        r##"
        {"event":"session-started","expected-count":3}
        {"event":"suite-declared","id":"s","name":"S"}
        {"event":"test-declared","id":"a","class-name":"S","method-name":"a","parent":"s"}
        {"event":"test-declared","id":"b","class-name":"S","method-name":"b","parent":"s"}
        {"event":"test-started","id":"a"}
        {"event":"test-ended","id":"a"}
        {"event":"test-started","id":"b"}
        {"event":"session-stopped"}
        "##,
    );
    let session = ingestor.session();

    assert_eq!(session.terminal_cause(), Some(TerminalCause::Stopped));
    assert_eq!(state(session, "b"), (ProgressState::Running, TestResult::Undefined));
    // Stopping completes the suite, and only its completed children count toward its result.
    assert_eq!(state(session, "s"), (ProgressState::Completed, TestResult::Ok));
    assert_eq!(
        (session.progress(), session.result()),
        (ProgressState::Completed, TestResult::Ok)
    );
    session.check_consistency().unwrap();
    // The expected count is larger than the number of known tests.
    assert_eq!(session.counters().total, 3);
    assert_eq!(session.counters().started, 2);
}

#[test]
fn undeclared_tests_are_collected_as_unrooted() {
    let ingestor = ingest_all(
        r##"
        {"event":"session-started","expected-count":1}
        {"event":"suite-declared","id":"s","name":"S"}
        {"event":"test-declared","id":"known","class-name":"S","method-name":"known","parent":"s"}
        {"event":"test-started","id":"stray","class-name":"Other","method-name":"stray"}
        {"event":"test-failed","id":"stray","failure":{"kind":"failure"}}
        {"event":"test-declared","id":"orphan","class-name":"S","method-name":"orphan","parent":"missing"}
        "##,
    );
    let session = ingestor.session();

    let unrooted = session.unrooted_suite().expect("unrooted suite was created");
    assert_eq!(unrooted.id().as_str(), ElementId::UNROOTED);
    assert_eq!(unrooted.display_name(), "Unrooted Tests");
    assert_eq!(child_names(session, ElementId::UNROOTED), ["stray", "orphan"]);
    assert_eq!(
        session.find("stray").unwrap().as_case().unwrap().qualified_name(),
        "Other::stray"
    );
    // One of two children completed.
    assert_eq!(
        state(session, ElementId::UNROOTED),
        (ProgressState::Running, TestResult::Undefined)
    );
    assert_eq!(session.counters().total, 3);
    assert_eq!(session.counters().failures, 1);
    session.check_consistency().unwrap();
}

#[test]
fn terminal_session_accepts_only_reruns() {
    let mut ingestor = ingest_all(TWO_CASE_RUN);

    let err = ingestor
        .apply(SessionEvent::TestStarted {
            id: "case1".into(),
            class_name: None,
            method_name: None,
        })
        .unwrap_err();
    assert!(
        matches!(err, IngestError::SessionTerminated { event: "test-started" }),
        "unexpected error: {err}"
    );

    // A second terminal event is ignored, and the first cause wins.
    ingestor.apply(SessionEvent::SessionTerminated).unwrap();
    assert_eq!(
        ingestor.session().terminal_cause(),
        Some(TerminalCause::Finished)
    );

    ingestor
        .apply(SessionEvent::TestReran {
            id: "case2".into(),
            status: RerunStatus::Ok,
            failure: None,
        })
        .unwrap();
    let session = ingestor.session();
    assert_eq!(
        state(session, "case2"),
        (ProgressState::Completed, TestResult::Ok)
    );
    assert_eq!(state(session, "suite").1, TestResult::Ok);
    assert_eq!(session.result(), TestResult::Ok);
    assert_eq!(session.counters().errors, 0);
    assert!(session.find("case2").unwrap().failure().is_none());

    let err = ingestor
        .apply(SessionEvent::TestReran {
            id: "suite".into(),
            status: RerunStatus::Ok,
            failure: None,
        })
        .unwrap_err();
    assert!(matches!(err, IngestError::UnknownCase { .. }), "{err}");
}

#[derive(Clone, Default)]
struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl SessionListener for Transcript {
    fn session_started(&mut self, session: &TestRunSession) {
        self.push(format!("started {}", session.name()));
    }

    fn session_finished(&mut self, session: &TestRunSession) {
        self.push(format!("finished {}", session.result()));
    }

    fn test_case_started(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        self.push(format!("start {}", case.id()));
    }

    fn test_case_finished(&mut self, session: &TestRunSession, case: &TestCaseElement) {
        // The session passed in already reflects the completed case.
        let parent = session.parent(case.index()).unwrap();
        self.push(format!(
            "end {} {} (parent {})",
            case.id(),
            case.result(),
            parent.progress()
        ));
    }
}

impl Transcript {
    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }
}

#[test]
fn listeners_observe_the_updated_session() {
    let transcript = Transcript::default();
    let mut listeners = ListenerSet::new();
    listeners.add(transcript.clone());

    let mut ingestor = ingestor_with(listeners);
    for event in parse_events(TWO_CASE_RUN) {
        ingestor.apply(event).unwrap();
    }

    assert_eq!(
        *transcript.lines.lock().unwrap(),
        [
            "started nightly",
            "start case1",
            "end case1 ok (parent running)",
            "start case2",
            "end case2 error (parent completed)",
            "finished error",
        ]
    );
}

#[test]
fn flat_log_adapter_projects_events() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut listeners = ListenerSet::new();
    listeners.add(FlatLogAdapter::new(move |event| {
        sink.lock().unwrap().push(event)
    }));

    let mut ingestor = ingestor_with(listeners);
    for event in parse_events(TWO_CASE_RUN) {
        ingestor.apply(event).unwrap();
    }

    let events = events.lock().unwrap();
    assert_eq!(events.first(), Some(&FlatLogEvent::RunStarted { test_count: 2 }));
    assert_eq!(
        events.last(),
        Some(&FlatLogEvent::RunEnded {
            elapsed: Some(std::time::Duration::from_secs(1)),
        })
    );
    let failed = events
        .iter()
        .position(|event| matches!(event, FlatLogEvent::TestFailed { .. }))
        .unwrap();
    assert_eq!(
        events[failed],
        FlatLogEvent::TestFailed {
            status: "error",
            id: "case2".into(),
            name: "calc.Calculator::divides".to_owned(),
            trace: "division by zero".to_owned(),
        }
    );
    assert_eq!(
        events[failed + 1],
        FlatLogEvent::TestEnded {
            id: "case2".into(),
            name: "calc.Calculator::divides".to_owned(),
        }
    );
}

#[test]
fn swap_requires_supporting_listeners() {
    let dir = camino_tempfile::Utf8TempDir::new().unwrap();
    let store = SwapStore::new(dir.path().join("swap"));

    let mut listeners = ListenerSet::new();
    listeners.add(Transcript::default());
    let mut ingestor = ingestor_with(listeners);
    for event in parse_events(TWO_CASE_RUN) {
        ingestor.apply(event).unwrap();
    }
    assert!(matches!(
        ingestor.swap_out(&store),
        Err(SwapError::Unsupported)
    ));

    let ingestor = ingest_all(TWO_CASE_RUN);
    let swapped = ingestor.swap_out(&store).unwrap();
    assert_eq!(swapped.name(), "nightly");
    assert_eq!(swapped.counters(), ingestor.session().counters());
    assert_eq!(swapped.terminal_cause(), TerminalCause::Finished);

    let restored = store.swap_in(&swapped).unwrap();
    assert_eq!(restored.session_id(), ingestor.session().session_id());
    assert_eq!(
        state(&restored, "case2"),
        (ProgressState::Completed, TestResult::Error)
    );
    store.discard(swapped).unwrap();
}

#[tokio::test]
async fn pump_applies_streamed_events() {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let task = spawn_ingestor(ingestor_with(ListenerSet::new()), receiver);

    let input = format!("{TWO_CASE_RUN}\nnot json at all\n");
    let stats = read_event_stream(input.as_bytes(), &sender).await.unwrap();
    assert_eq!(stats.forwarded, 10);
    assert_eq!(stats.skipped, 1);
    drop(sender);

    let ingestor = task.join().await.unwrap();
    let session = ingestor.session();
    assert_eq!(session.terminal_cause(), Some(TerminalCause::Finished));
    assert_eq!(session.counters().errors, 1);
    session.check_consistency().unwrap();
}

#[tokio::test]
async fn snapshots_are_taken_between_events() {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let task = spawn_ingestor(ingestor_with(ListenerSet::new()), receiver);

    for event in parse_events(TWO_CASE_RUN) {
        sender.send(event).unwrap();
        let snapshot = task.snapshot();
        snapshot.check_consistency().unwrap();
    }
    drop(sender);

    let ingestor = task.join().await.unwrap();
    assert_eq!(ingestor.session().progress(), ProgressState::Completed);
}
