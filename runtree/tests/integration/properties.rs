// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use proptest::{collection::vec, prelude::*};
use runtree::{
    events::{RerunStatus, SessionEvent},
    ingest::{EventIngestor, IngestOptions},
    listener::ListenerSet,
    prioritize::prioritize,
    serialize::{ExportOptions, export_session, import_session},
    session::{
        ElementId, FailureKind, FailureTrace, ProgressState, RunCounters, TestElement,
        TestRunSession,
    },
};
use std::collections::{BTreeMap, BTreeSet};
use test_strategy::{Arbitrary, proptest};

/// Case IDs at or above this index are never declared.
const MAX_CASE: usize = 12;

#[derive(Clone, Debug, Arbitrary)]
enum Action {
    Start,
    End,
    Fail(bool),
    Ignore,
    Rerun(RerunOutcome),
    FailSuite(bool),
    Stop,
    Finish,
}

#[derive(Clone, Copy, Debug, Arbitrary)]
enum RerunOutcome {
    Ok,
    Failure,
    Error,
}

#[derive(Clone, Debug, Arbitrary)]
struct Step {
    #[strategy(0usize..MAX_CASE + 3)]
    target: usize,
    action: Action,
}

/// A tree shape and a sequence of events against it.
#[derive(Clone, Debug, Arbitrary)]
struct Scenario {
    #[strategy(1usize..4)]
    suites: usize,
    #[strategy(0usize..5)]
    cases_per_suite: usize,
    wrap_first: bool,
    #[strategy(vec(any::<Step>(), 0..48))]
    steps: Vec<Step>,
}

impl Scenario {
    fn declared_cases(&self) -> usize {
        (self.suites * self.cases_per_suite).min(MAX_CASE)
    }

    /// Declarations: suite `s1` nests inside `s0`, and `s0` is optionally wrapped.
    fn declarations(&self) -> Vec<SessionEvent> {
        let mut events = vec![SessionEvent::SessionStarted {
            expected_count: self.declared_cases(),
            name: None,
            timestamp: None,
        }];
        if self.wrap_first {
            events.push(SessionEvent::SuiteDeclared {
                id: "w0".into(),
                name: "W0".to_owned(),
                parent: None,
                wrapper: true,
            });
        }
        for suite in 0..self.suites {
            let parent = match suite {
                0 if self.wrap_first => Some("w0".into()),
                1 => Some("s0".into()),
                _ => None,
            };
            events.push(SessionEvent::SuiteDeclared {
                id: format!("s{suite}").into(),
                name: format!("S{suite}"),
                parent,
                wrapper: false,
            });
        }
        for case in 0..self.declared_cases() {
            events.push(SessionEvent::TestDeclared {
                id: format!("c{case}").into(),
                class_name: format!("S{}", case % self.suites),
                method_name: format!("m{case}"),
                parent: format!("s{}", case % self.suites).into(),
            });
        }
        events
    }

    fn event(&self, step: &Step) -> SessionEvent {
        let id: ElementId = format!("c{}", step.target).into();
        let failure = |error: bool| {
            FailureTrace::new(if error {
                FailureKind::Error
            } else {
                FailureKind::Failure
            })
        };
        match step.action {
            Action::Start => SessionEvent::TestStarted {
                id,
                class_name: None,
                method_name: None,
            },
            Action::End => SessionEvent::TestEnded { id, elapsed: None },
            Action::Fail(error) => SessionEvent::TestFailed {
                id,
                failure: failure(error),
                elapsed: None,
            },
            Action::Ignore => SessionEvent::TestIgnored { id, elapsed: None },
            Action::Rerun(outcome) => SessionEvent::TestReran {
                id,
                status: match outcome {
                    RerunOutcome::Ok => RerunStatus::Ok,
                    RerunOutcome::Failure => RerunStatus::Failure,
                    RerunOutcome::Error => RerunStatus::Error,
                },
                failure: None,
            },
            Action::FailSuite(error) => SessionEvent::TestFailed {
                id: format!("s{}", step.target % self.suites).into(),
                failure: failure(error),
                elapsed: None,
            },
            Action::Stop => SessionEvent::SessionStopped,
            Action::Finish => SessionEvent::SessionFinished { elapsed: None },
        }
    }
}

fn progress_by_id(session: &TestRunSession) -> BTreeMap<ElementId, ProgressState> {
    session
        .iter()
        .map(|element| (element.id().clone(), element.progress()))
        .collect()
}

fn run_scenario(scenario: &Scenario, mut check: impl FnMut(&TestRunSession)) -> TestRunSession {
    let mut ingestor = EventIngestor::new("prop", ListenerSet::new(), IngestOptions::default());
    let events = scenario
        .declarations()
        .into_iter()
        .chain(scenario.steps.iter().map(|step| scenario.event(step)));
    for event in events {
        // Rejected events leave the session untouched, which is also checked.
        let _ = ingestor.apply(event);
        check(ingestor.session());
    }
    ingestor.into_session()
}

#[proptest(cases = 256)]
fn incremental_aggregation_matches_recomputation(scenario: Scenario) {
    let mut failure = None;
    run_scenario(&scenario, |session| {
        if failure.is_none() {
            failure = session.check_consistency().err().map(|err| err.to_string());
        }
    });
    prop_assert_eq!(failure, None);
}

#[proptest(cases = 256)]
fn progress_never_moves_backwards(scenario: Scenario) {
    let mut previous: BTreeMap<ElementId, ProgressState> = BTreeMap::new();
    let mut regressions = Vec::new();
    run_scenario(&scenario, |session| {
        let current = progress_by_id(session);
        for (id, before) in &previous {
            // The unrooted suite can gain new, unstarted tests after it completed.
            if id.as_str() == ElementId::UNROOTED {
                continue;
            }
            if let Some(after) = current.get(id) {
                if after < before {
                    regressions.push(format!("{id}: {before} -> {after}"));
                }
            }
        }
        previous = current;
    });
    prop_assert!(regressions.is_empty(), "regressions: {:?}", regressions);
}

#[proptest(cases = 256)]
fn counters_never_decrease_before_the_session_ends(scenario: Scenario) {
    // Reruns replace a test's result outright, so they are left out here.
    let mut scenario = scenario;
    scenario
        .steps
        .retain(|step| !matches!(step.action, Action::Rerun(_)));

    let mut previous = RunCounters::default();
    let mut decreases = Vec::new();
    run_scenario(&scenario, |session| {
        let current = session.counters();
        let fields = [
            ("started", previous.started, current.started),
            ("total", previous.total, current.total),
            ("failures", previous.failures, current.failures),
            ("errors", previous.errors, current.errors),
            ("ignored", previous.ignored, current.ignored),
        ];
        for (name, before, after) in fields {
            if after < before {
                decreases.push(format!("{name}: {before} -> {after}"));
            }
        }
        previous = current;
    });
    prop_assert!(decreases.is_empty(), "decreases: {:?}", decreases);
}

#[proptest(cases = 128)]
fn export_import_round_trips(scenario: Scenario) {
    let session = run_scenario(&scenario, |_| {});
    let exported = export_session(&session, &ExportOptions::default()).unwrap();
    let imported = import_session(&exported).unwrap();
    prop_assert!(imported.check_consistency().is_ok());
    prop_assert_eq!(imported.counters(), session.counters());
    let reexported = export_session(&imported, &ExportOptions::default()).unwrap();
    prop_assert_eq!(reexported, exported);
}

#[proptest(cases = 128)]
fn prioritizing_only_reorders_siblings(
    scenario: Scenario,
    #[strategy(vec(0usize..MAX_CASE, 0..6))] priority: Vec<usize>,
) {
    let session = run_scenario(&scenario, |_| {});
    let names: Vec<String> = priority
        .iter()
        .map(|case| format!("S{}::m{case}", case % scenario.suites))
        .collect();
    let prioritized = prioritize(&session, names.as_slice());

    prop_assert!(prioritized.check_consistency().is_ok());
    prop_assert_eq!(prioritized.counters(), session.counters());
    for element in session.iter() {
        let TestElement::Suite(suite) = element else {
            continue;
        };
        let children = |session: &TestRunSession| -> BTreeSet<ElementId> {
            session
                .children(suite.index())
                .map(|child| child.id().clone())
                .collect()
        };
        prop_assert_eq!(children(&prioritized), children(&session));
    }
}
