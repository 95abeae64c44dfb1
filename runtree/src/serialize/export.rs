// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ACTUAL_TAG, ERROR_TAG, EXPECTED_TAG, FAILURE_TAG, TESTCASE_TAG, TESTRUN_TAG, TESTSUITE_TAG,
    TESTWRAPPER_TAG, TRACE_TAG,
};
use crate::{
    errors::ExportError,
    session::{
        ContainerKind, FailureKind, FailureTrace, TestCaseElement, TestElement, TestRunSession,
        TestSuiteElement,
    },
};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{io, time::Duration};

/// Options for [`export_session`] and [`write_session`].
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// The number of spaces to indent each level by. 0 disables indentation and line breaks.
    pub indent: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { indent: 4 }
    }
}

/// Exports a session to a string.
///
/// The output is deterministic: exporting the same session twice produces byte-identical
/// documents.
pub fn export_session(
    session: &TestRunSession,
    options: &ExportOptions,
) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_session(session, &mut buf, options)?;
    Ok(String::from_utf8(buf)?)
}

/// Writes a session document to `writer`.
pub fn write_session(
    session: &TestRunSession,
    writer: impl io::Write,
    options: &ExportOptions,
) -> Result<(), ExportError> {
    let mut writer = if options.indent == 0 {
        Writer::new(writer)
    } else {
        Writer::new_with_indent(writer, b' ', options.indent)
    };

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    serialize_run(session, &mut writer)?;

    // Add a trailing newline.
    writer.write_indent()?;
    Ok(())
}

fn serialize_run(
    session: &TestRunSession,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    let counters = session.counters();
    let root = session.root();

    let mut run_tag = BytesStart::new(TESTRUN_TAG);
    run_tag.extend_attributes([
        ("name", session.name()),
        ("progress", root.common.progress.as_str()),
        ("result", root.common.result.as_str()),
    ]);
    if let Some(cause) = session.terminal_cause() {
        run_tag.push_attribute(("terminal", cause.as_str()));
    }
    run_tag.extend_attributes([
        ("tests", counters.total.to_string().as_str()),
        ("started", counters.started.to_string().as_str()),
        ("failures", counters.failures.to_string().as_str()),
        ("errors", counters.errors.to_string().as_str()),
        ("ignored", counters.ignored.to_string().as_str()),
    ]);
    if let Some(elapsed) = session.elapsed() {
        run_tag.push_attribute(("time", serialize_time(elapsed).as_str()));
    }
    if let Some(start_time) = session.start_time() {
        run_tag.push_attribute(("timestamp", start_time.format("%+").to_string().as_str()));
    }

    if root.child_indexes().is_empty() {
        writer.write_event(Event::Empty(run_tag))?;
        return Ok(());
    }

    writer.write_event(Event::Start(run_tag))?;
    for child in session.children(root.common.index) {
        serialize_element(session, child, writer)?;
    }
    serialize_end_tag(TESTRUN_TAG, writer)
}

fn serialize_element(
    session: &TestRunSession,
    element: &TestElement,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    match element {
        TestElement::Case(case) => serialize_case(case, writer),
        TestElement::Suite(suite) => serialize_suite(session, suite, writer),
    }
}

fn serialize_suite(
    session: &TestRunSession,
    suite: &TestSuiteElement,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    // Use the destructuring syntax to ensure that all fields are handled.
    let TestSuiteElement {
        common,
        kind,
        children,
    } = suite;

    let tag_name = match kind {
        ContainerKind::Wrapper => TESTWRAPPER_TAG,
        // The session root is written by serialize_run, so anything else is a plain suite.
        ContainerKind::Suite | ContainerKind::Session => TESTSUITE_TAG,
    };

    let mut suite_tag = BytesStart::new(tag_name);
    suite_tag.extend_attributes([
        ("id", common.id.as_str()),
        ("name", common.display_name.as_str()),
        ("progress", common.progress.as_str()),
        ("result", common.result.as_str()),
    ]);
    if let Some(elapsed) = common.elapsed {
        suite_tag.push_attribute(("time", serialize_time(elapsed).as_str()));
    }

    if children.is_empty() && common.failure.is_none() {
        writer.write_event(Event::Empty(suite_tag))?;
        return Ok(());
    }

    writer.write_event(Event::Start(suite_tag))?;
    if let Some(failure) = &common.failure {
        serialize_failure(failure, writer)?;
    }
    for child in session.children(common.index) {
        serialize_element(session, child, writer)?;
    }
    serialize_end_tag(tag_name, writer)
}

fn serialize_case(
    case: &TestCaseElement,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    let TestCaseElement {
        common,
        class_name,
        method_name,
    } = case;

    let mut case_tag = BytesStart::new(TESTCASE_TAG);
    case_tag.extend_attributes([
        ("id", common.id.as_str()),
        ("name", method_name.as_str()),
        ("classname", class_name.as_str()),
        ("progress", common.progress.as_str()),
        ("result", common.result.as_str()),
    ]);
    if let Some(elapsed) = common.elapsed {
        case_tag.push_attribute(("time", serialize_time(elapsed).as_str()));
    }

    match &common.failure {
        None => {
            writer.write_event(Event::Empty(case_tag))?;
        }
        Some(failure) => {
            writer.write_event(Event::Start(case_tag))?;
            serialize_failure(failure, writer)?;
            serialize_end_tag(TESTCASE_TAG, writer)?;
        }
    }
    Ok(())
}

fn serialize_failure(
    failure: &FailureTrace,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    let FailureTrace {
        kind,
        exception_type,
        expected,
        actual,
        trace,
    } = failure;

    let tag_name = match kind {
        FailureKind::Failure => FAILURE_TAG,
        FailureKind::Error => ERROR_TAG,
    };
    let mut failure_tag = BytesStart::new(tag_name);
    if let Some(exception_type) = exception_type {
        failure_tag.push_attribute(("type", exception_type.as_str()));
    }

    let trace = strip_ansi_escapes::strip_str(trace);
    if expected.is_none() && actual.is_none() && trace.is_empty() {
        writer.write_event(Event::Empty(failure_tag))?;
        return Ok(());
    }

    writer.write_event(Event::Start(failure_tag))?;
    if let Some(expected) = expected {
        serialize_text_field(EXPECTED_TAG, expected, writer)?;
    }
    if let Some(actual) = actual {
        serialize_text_field(ACTUAL_TAG, actual, writer)?;
    }
    if !trace.is_empty() {
        serialize_text_field(TRACE_TAG, &trace, writer)?;
    }
    serialize_end_tag(tag_name, writer)
}

fn serialize_text_field(
    tag_name: &'static str,
    text: &str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new(tag_name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    serialize_end_tag(tag_name, writer)
}

fn serialize_end_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), ExportError> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
    Ok(())
}

fn serialize_time(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}
