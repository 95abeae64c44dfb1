// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{import_document, write_stdout};
use crate::{
    Result,
    output::{OutputContext, SessionStyles},
};
use camino::Utf8PathBuf;
use clap::Args;
use owo_colors::OwoColorize;
use runtree::session::{FailureTrace, NodeIndex, ProgressState, TestElement, TestRunSession};
use std::{io::Write, time::Duration};
use swrite::{SWrite, swrite, swriteln};

#[derive(Debug, Args)]
pub(crate) struct ShowOpts {
    /// Session document to show
    #[arg(value_name = "DOCUMENT")]
    document: Utf8PathBuf,

    /// Also print failure details and traces
    #[arg(long)]
    traces: bool,
}

impl ShowOpts {
    pub(crate) fn exec(self, output: OutputContext, stdout: &mut dyn Write) -> Result<i32> {
        let session = import_document(&self.document)?;
        let rendered = render_session(&session, &output.stdout_styles(), self.traces);
        write_stdout(stdout, |stdout| stdout.write_all(rendered.as_bytes()))?;
        Ok(0)
    }
}

/// Width of the status column.
const STATUS_WIDTH: usize = 11;

fn render_session(session: &TestRunSession, styles: &SessionStyles, traces: bool) -> String {
    let mut out = String::new();
    let cause = session
        .terminal_cause()
        .map_or("in progress", |cause| cause.as_str());
    swriteln!(
        out,
        "{} ({cause}): {}",
        session.name().style(styles.suite),
        session.counters()
    );
    for child in session.children(NodeIndex::ROOT) {
        render_element(session, child, 1, styles, traces, &mut out);
    }
    out
}

fn render_element(
    session: &TestRunSession,
    element: &TestElement,
    depth: usize,
    styles: &SessionStyles,
    traces: bool,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let status = status_label(element.progress(), element.result().as_str());
    swrite!(
        out,
        "{indent}{} ",
        status.style(styles.for_result(element.result()))
    );

    match element {
        TestElement::Case(case) => {
            swrite!(out, "{}", case.qualified_name());
        }
        TestElement::Suite(suite) => {
            swrite!(out, "{}", suite.display_name().style(styles.suite));
            if suite.is_wrapper() {
                swrite!(out, " [wrapper]");
            }
        }
    }
    if let Some(elapsed) = element.elapsed() {
        swrite!(out, " [{}]", format_elapsed(elapsed));
    }
    swriteln!(out);

    if traces {
        if let Some(failure) = element.failure() {
            render_failure(failure, &indent, styles, out);
        }
    }

    for child in session.children(element.index()) {
        render_element(session, child, depth + 1, styles, traces, out);
    }
}

fn status_label(progress: ProgressState, result: &str) -> String {
    let label = match progress {
        ProgressState::Completed => result.to_uppercase(),
        ProgressState::Running | ProgressState::NotStarted => progress.as_str().to_uppercase(),
    };
    format!("{label:>STATUS_WIDTH$}")
}

fn render_failure(failure: &FailureTrace, indent: &str, styles: &SessionStyles, out: &mut String) {
    let pad = " ".repeat(STATUS_WIDTH + 1);
    if let Some(exception_type) = &failure.exception_type {
        swriteln!(out, "{indent}{pad}{exception_type}");
    }
    if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
        swriteln!(out, "{indent}{pad}{} {expected}", "expected:".style(styles.removed));
        swriteln!(out, "{indent}{pad}{}   {actual}", "actual:".style(styles.added));
    }
    for line in failure.trace.lines() {
        swriteln!(out, "{indent}{pad}{}", line.style(styles.pending));
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use runtree::serialize::import_session;

    const DOCUMENT: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <testrun name="nightly" progress="completed" result="error" terminal="stopped" tests="3" started="2" failures="0" errors="1" ignored="0">
            <testwrapper id="w" name="Fixture" progress="completed" result="error">
                <testsuite id="s" name="Calculator" progress="completed" result="error">
                    <testcase id="a" name="adds" classname="calc.Calculator" progress="completed" result="ok" time="0.125"/>
                    <testcase id="b" name="divides" classname="calc.Calculator" progress="completed" result="error">
                        <error type="ArithmeticError">
                            <expected>2</expected>
                            <actual>inf</actual>
                            <trace>at divide
        at main</trace>
                        </error>
                    </testcase>
                    <testcase id="c" name="negates" classname="calc.Calculator" progress="not-started" result="undefined"/>
                </testsuite>
            </testwrapper>
        </testrun>
    "#};

    #[test]
    fn renders_tree() {
        let session = import_session(DOCUMENT).unwrap();
        let rendered = render_session(&session, &SessionStyles::default(), false);
        assert_eq!(
            rendered,
            indoc! {"
                nightly (stopped): 3 tests: 2 started, 0 failures, 1 errors, 0 ignored
                        ERROR Fixture [wrapper]
                          ERROR Calculator
                               OK calc.Calculator::adds [0.125s]
                            ERROR calc.Calculator::divides
                      NOT-STARTED calc.Calculator::negates
            "}
        );
    }

    #[test]
    fn renders_traces() {
        let session = import_session(DOCUMENT).unwrap();
        let rendered = render_session(&session, &SessionStyles::default(), true);
        let divides = rendered
            .lines()
            .skip_while(|line| !line.contains("divides"))
            .skip(1)
            .take(5)
            .collect::<Vec<_>>();
        assert_eq!(
            divides,
            [
                "                  ArithmeticError",
                "                  expected: 2",
                "                  actual:   inf",
                "                  at divide",
                "                  at main",
            ]
        );
    }
}
