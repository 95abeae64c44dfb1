// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use indoc::indoc;
use pretty_assertions::assert_eq;
use runtree::{
    errors::ImportError,
    events::{RerunStatus, SessionEvent},
    ingest::{EventIngestor, IngestOptions},
    listener::ListenerSet,
    serialize::{ExportOptions, export_session, import_session, normalize_document},
    session::{ElementId, ProgressState, TestResult},
};

#[test]
fn exported_run_reimports() {
    let ingestor = ingest_all(TWO_CASE_RUN);
    let exported = export_session(ingestor.session(), &ExportOptions::default()).unwrap();

    let imported = import_session(&exported).unwrap();
    imported.check_consistency().unwrap();
    assert_eq!(imported.name(), "nightly");
    assert_eq!(imported.counters(), ingestor.session().counters());
    assert_eq!(
        state(&imported, "case2"),
        (ProgressState::Completed, TestResult::Error)
    );

    let reexported = export_session(&imported, &ExportOptions::default()).unwrap();
    assert_eq!(reexported, exported);
}

#[test]
fn normalized_documents_compare_equal() {
    let ingestor = ingest_all(TWO_CASE_RUN);
    let compact = export_session(ingestor.session(), &ExportOptions { indent: 0 }).unwrap();
    let pretty = export_session(ingestor.session(), &ExportOptions { indent: 2 }).unwrap();
    assert_ne!(compact, pretty);

    let normalized = normalize_document(&compact).unwrap();
    assert_eq!(normalize_document(&pretty).unwrap(), normalized);
    assert_eq!(
        normalized,
        indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <testrun name="nightly" progress="completed" result="error" terminal="finished" tests="2" started="2" failures="0" errors="1" ignored="0">
                <testsuite id="suite" name="Calculator" progress="completed" result="error">
                    <testcase id="case1" name="adds" classname="calc.Calculator" progress="completed" result="ok"/>
                    <testcase id="case2" name="divides" classname="calc.Calculator" progress="completed" result="error">
                        <error type="ArithmeticError"/>
                    </testcase>
                </testsuite>
            </testrun>
        "#}
    );
}

#[test]
fn imported_session_accepts_reruns() {
    let ingestor = ingest_all(
        r##"
        {"event":"session-started","expected-count":1}
        {"event":"test-started","id":"x","class-name":"Loose","method-name":"x"}
        {"event":"test-failed","id":"x","failure":{"kind":"failure","expected":"1","actual":"2"}}
        {"event":"session-terminated"}
        "##,
    );
    let exported = export_session(ingestor.session(), &ExportOptions::default()).unwrap();

    let imported = import_session(&exported).unwrap();
    let unrooted = imported.unrooted_suite().expect("unrooted suite survives");
    assert_eq!(unrooted.id().as_str(), ElementId::UNROOTED);
    let failure = imported.find("x").unwrap().failure().unwrap();
    assert!(failure.is_comparison_failure());

    let mut ingestor =
        EventIngestor::with_session(imported, ListenerSet::new(), IngestOptions::default());
    ingestor
        .apply(SessionEvent::TestReran {
            id: "x".into(),
            status: RerunStatus::Ok,
            failure: None,
        })
        .unwrap();
    let session = ingestor.session();
    assert_eq!(session.result(), TestResult::Ok);
    assert_eq!(session.counters().failures, 0);
    session.check_consistency().unwrap();
}

#[test]
fn garbage_is_rejected() {
    let err = import_session("<notarun/>").unwrap_err();
    assert!(
        matches!(err, ImportError::UnknownElementKind { ref tag } if tag == "notarun"),
        "unexpected error: {err}"
    );
}
