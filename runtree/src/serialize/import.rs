// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ACTUAL_TAG, ERROR_TAG, EXPECTED_TAG, FAILURE_TAG, TESTCASE_TAG, TESTRUN_TAG, TESTSUITE_TAG,
    TESTWRAPPER_TAG, TRACE_TAG,
};
use crate::{
    errors::ImportError,
    session::{
        ElementId, FailureKind, FailureTrace, NewElement, NodeIndex, ProgressState, RunCounters,
        TerminalCause, TestResult, TestRunSession,
    },
};
use chrono::{DateTime, FixedOffset};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{collections::HashMap, str::FromStr, time::Duration};
use tracing::debug;

/// Imports a session from a document produced by [`export_session`](super::export_session).
///
/// The imported session has the same structure, names, states and counters as the exported one.
/// Either the whole document is imported or an error is returned.
pub fn import_session(input: &str) -> Result<TestRunSession, ImportError> {
    let mut reader = Reader::from_str(input);
    // Nesting is checked while building the tree, so that it's reported as a malformed document.
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;
    let mut state = ImportState::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => state.start(&start)?,
            Event::Empty(start) => {
                state.start(&start)?;
                state.end(tag_name(&start)?)?;
            }
            Event::End(end) => {
                let name = std::str::from_utf8(end.name().as_ref())
                    .map_err(|_| ImportError::malformed("end tag is not valid UTF-8"))?
                    .to_owned();
                state.end(&name)?;
            }
            Event::Text(text) => state.text(&text.unescape()?)?,
            Event::CData(cdata) => {
                let text = std::str::from_utf8(&cdata)
                    .map_err(|_| ImportError::malformed("CDATA section is not valid UTF-8"))?;
                state.text(text)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes carry no data.
            _ => {}
        }
    }

    state.finish()
}

/// An element whose stored state is applied once the whole tree has been built.
///
/// Inserting children re-aggregates their ancestors, so stored states can only be restored after
/// every element is in place.
struct Restored {
    index: NodeIndex,
    progress: ProgressState,
    result: TestResult,
    elapsed: Option<Duration>,
    failure: Option<FailureTrace>,
}

struct RunAttrs {
    terminal: Option<TerminalCause>,
    counters: RunCounters,
    elapsed: Option<Duration>,
    start_time: Option<DateTime<FixedOffset>>,
}

enum Frame {
    Run,
    Element {
        tag: &'static str,
        restored: usize,
        is_case: bool,
    },
    Failure {
        tag: &'static str,
        restored: usize,
        trace: FailureTrace,
    },
    Field {
        tag: &'static str,
        text: String,
    },
}

impl Frame {
    fn tag(&self) -> &'static str {
        match self {
            Self::Run => TESTRUN_TAG,
            Self::Element { tag, .. } | Self::Failure { tag, .. } | Self::Field { tag, .. } => tag,
        }
    }
}

#[derive(Default)]
struct ImportState {
    session: Option<(TestRunSession, RunAttrs)>,
    stack: Vec<Frame>,
    restored: Vec<Restored>,
    done: bool,
}

impl ImportState {
    fn start(&mut self, start: &BytesStart<'_>) -> Result<(), ImportError> {
        let name = tag_name(start)?;
        let mut attrs = Attributes::new(name, start)?;

        if self.done {
            return Err(ImportError::malformed(format!(
                "unexpected <{name}> after the end of <{TESTRUN_TAG}>"
            )));
        }

        match name {
            TESTRUN_TAG => {
                if self.session.is_some() {
                    return Err(ImportError::malformed(format!(
                        "<{TESTRUN_TAG}> must be the document root"
                    )));
                }
                let session = TestRunSession::new(attrs.required("name")?);
                let run = RunAttrs {
                    terminal: attrs
                        .optional("terminal")
                        .map(|terminal| {
                            TerminalCause::from_str_opt(&terminal).ok_or_else(|| {
                                ImportError::malformed(format!(
                                    "<{TESTRUN_TAG}> has unknown terminal cause `{terminal}`"
                                ))
                            })
                        })
                        .transpose()?,
                    counters: RunCounters {
                        total: attrs.parse("tests")?,
                        started: attrs.parse("started")?,
                        failures: attrs.parse("failures")?,
                        errors: attrs.parse("errors")?,
                        ignored: attrs.parse("ignored")?,
                    },
                    elapsed: attrs.time()?,
                    start_time: attrs
                        .optional("timestamp")
                        .map(|timestamp| {
                            DateTime::parse_from_rfc3339(&timestamp).map_err(|err| {
                                ImportError::malformed(format!(
                                    "<{TESTRUN_TAG}> has invalid timestamp `{timestamp}`: {err}"
                                ))
                            })
                        })
                        .transpose()?,
                };
                self.restored.push(Restored {
                    index: NodeIndex::ROOT,
                    progress: attrs.parse("progress")?,
                    result: attrs.parse("result")?,
                    elapsed: run.elapsed,
                    failure: None,
                });
                self.session = Some((session, run));
                self.stack.push(Frame::Run);
            }
            TESTSUITE_TAG | TESTWRAPPER_TAG | TESTCASE_TAG => {
                let parent = self.parent_container(name)?;
                let id = ElementId::new(attrs.required("id")?);
                let element = match name {
                    TESTCASE_TAG => NewElement::case(
                        id.clone(),
                        attrs.required("classname")?,
                        attrs.required("name")?,
                    ),
                    TESTWRAPPER_TAG => NewElement::wrapper(id.clone(), attrs.required("name")?),
                    _ => NewElement::suite(id.clone(), attrs.required("name")?),
                };
                let progress = attrs.parse("progress")?;
                let result = attrs.parse("result")?;
                let elapsed = attrs.time()?;
                if id.as_str() == ElementId::UNROOTED
                    && (name != TESTSUITE_TAG || parent != NodeIndex::ROOT)
                {
                    return Err(ImportError::malformed(format!(
                        "`{id}` must be a <{TESTSUITE_TAG}> directly inside <{TESTRUN_TAG}>"
                    )));
                }

                let session = self.session_mut()?;
                let index = session
                    .insert(parent, element)
                    .map_err(|err| ImportError::malformed(err.to_string()))?;
                if id.as_str() == ElementId::UNROOTED {
                    session.mark_unrooted(index);
                }

                self.restored.push(Restored {
                    index,
                    progress,
                    result,
                    elapsed,
                    failure: None,
                });
                self.stack.push(Frame::Element {
                    tag: static_tag(name),
                    restored: self.restored.len() - 1,
                    is_case: name == TESTCASE_TAG,
                });
            }
            FAILURE_TAG | ERROR_TAG => {
                let restored = match self.stack.last() {
                    Some(Frame::Element { restored, .. }) => *restored,
                    _ => {
                        return Err(ImportError::malformed(format!(
                            "<{name}> must be inside a test case or suite"
                        )));
                    }
                };
                if self.restored[restored].failure.is_some() {
                    return Err(ImportError::malformed(format!(
                        "element has more than one <{FAILURE_TAG}> or <{ERROR_TAG}>"
                    )));
                }
                let kind = if name == FAILURE_TAG {
                    FailureKind::Failure
                } else {
                    FailureKind::Error
                };
                let mut trace = FailureTrace::new(kind);
                trace.exception_type = attrs.optional("type");
                self.stack.push(Frame::Failure {
                    tag: static_tag(name),
                    restored,
                    trace,
                });
            }
            EXPECTED_TAG | ACTUAL_TAG | TRACE_TAG => {
                if !matches!(self.stack.last(), Some(Frame::Failure { .. })) {
                    return Err(ImportError::malformed(format!(
                        "<{name}> must be inside <{FAILURE_TAG}> or <{ERROR_TAG}>"
                    )));
                }
                self.stack.push(Frame::Field {
                    tag: static_tag(name),
                    text: String::new(),
                });
            }
            other => {
                return Err(ImportError::UnknownElementKind {
                    tag: other.to_owned(),
                });
            }
        }

        attrs.log_unused();
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), ImportError> {
        let frame = self.stack.pop().ok_or_else(|| {
            ImportError::malformed(format!("unexpected closing tag </{name}>"))
        })?;
        if frame.tag() != name {
            return Err(ImportError::malformed(format!(
                "expected </{}>, found </{name}>",
                frame.tag()
            )));
        }

        match frame {
            Frame::Run => self.done = true,
            Frame::Element { .. } => {}
            Frame::Failure {
                restored, trace, ..
            } => {
                self.restored[restored].failure = Some(trace);
            }
            Frame::Field { tag, text } => {
                let Some(Frame::Failure { trace, .. }) = self.stack.last_mut() else {
                    unreachable!("fields are only pushed on top of failures");
                };
                let slot = match tag {
                    EXPECTED_TAG => &mut trace.expected,
                    ACTUAL_TAG => &mut trace.actual,
                    _ => {
                        trace.trace = text;
                        return Ok(());
                    }
                };
                if slot.is_some() {
                    return Err(ImportError::malformed(format!("duplicate <{tag}>")));
                }
                *slot = Some(text);
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), ImportError> {
        match self.stack.last_mut() {
            Some(Frame::Field { text: buf, .. }) => {
                buf.push_str(text);
                Ok(())
            }
            // Indentation between elements.
            _ if text.trim().is_empty() => Ok(()),
            Some(frame) => Err(ImportError::malformed(format!(
                "unexpected text inside <{}>",
                frame.tag()
            ))),
            None => Err(ImportError::malformed("unexpected text outside <testrun>")),
        }
    }

    fn finish(self) -> Result<TestRunSession, ImportError> {
        let Self {
            session,
            stack,
            restored,
            done,
        } = self;

        let Some((mut session, run)) = session else {
            return Err(ImportError::malformed(format!(
                "document has no <{TESTRUN_TAG}> element"
            )));
        };
        if !done || !stack.is_empty() {
            return Err(ImportError::malformed("unexpected end of document"));
        }

        for Restored {
            index,
            progress,
            result,
            elapsed,
            failure,
        } in restored
        {
            session.restore_element(index, progress, result, failure, elapsed);
        }
        session.restore_run(run.counters.total, run.terminal, run.elapsed, run.start_time);
        session.retally();

        let counters = session.counters();
        if counters != run.counters {
            return Err(ImportError::malformed(format!(
                "<{TESTRUN_TAG}> declares {} but its test cases add up to {counters}",
                run.counters,
            )));
        }
        if let Err(err) = session.check_consistency() {
            debug!("imported session is not self-consistent: {err}");
        }

        Ok(session)
    }

    fn session_mut(&mut self) -> Result<&mut TestRunSession, ImportError> {
        self.session
            .as_mut()
            .map(|(session, _)| session)
            .ok_or_else(|| {
                ImportError::malformed(format!("<{TESTRUN_TAG}> must be the document root"))
            })
    }

    /// Returns the container that an element opened now would be a child of.
    fn parent_container(&self, name: &str) -> Result<NodeIndex, ImportError> {
        match self.stack.last() {
            Some(Frame::Run) => Ok(NodeIndex::ROOT),
            Some(Frame::Element {
                restored,
                is_case: false,
                ..
            }) => Ok(self.restored[*restored].index),
            Some(frame) => Err(ImportError::malformed(format!(
                "<{name}> cannot be inside <{}>",
                frame.tag()
            ))),
            None if self.session.is_none() => Err(ImportError::malformed(format!(
                "<{TESTRUN_TAG}> must be the document root"
            ))),
            None => Err(ImportError::malformed(format!(
                "<{name}> must be inside <{TESTRUN_TAG}>"
            ))),
        }
    }
}

/// The attributes of a start tag, removed from the map as they're consumed.
struct Attributes {
    tag: String,
    values: HashMap<String, String>,
}

impl Attributes {
    fn new(tag: &str, start: &BytesStart<'_>) -> Result<Self, ImportError> {
        let mut values = HashMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|_| ImportError::malformed("attribute name is not valid UTF-8"))?
                .to_owned();
            let value = attr.unescape_value()?.into_owned();
            values.insert(key, value);
        }
        Ok(Self {
            tag: tag.to_owned(),
            values,
        })
    }

    fn optional(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    fn required(&mut self, key: &str) -> Result<String, ImportError> {
        self.optional(key).ok_or_else(|| {
            ImportError::malformed(format!(
                "<{}> is missing required attribute `{key}`",
                self.tag
            ))
        })
    }

    fn parse<T>(&mut self, key: &str) -> Result<T, ImportError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.required(key)?;
        value.parse().map_err(|err| {
            ImportError::malformed(format!(
                "<{}> has invalid `{key}` value `{value}`: {err}",
                self.tag
            ))
        })
    }

    fn time(&mut self) -> Result<Option<Duration>, ImportError> {
        let Some(value) = self.optional("time") else {
            return Ok(None);
        };
        value
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| {
                ImportError::malformed(format!("<{}> has invalid time `{value}`", self.tag))
            })
    }

    fn log_unused(&self) {
        for key in self.values.keys() {
            debug!("ignoring unknown attribute `{key}` on <{}>", self.tag);
        }
    }
}

fn tag_name<'a>(start: &'a BytesStart<'_>) -> Result<&'a str, ImportError> {
    std::str::from_utf8(start.name().into_inner())
        .map_err(|_| ImportError::malformed("tag name is not valid UTF-8"))
}

fn static_tag(name: &str) -> &'static str {
    [
        TESTRUN_TAG,
        TESTSUITE_TAG,
        TESTWRAPPER_TAG,
        TESTCASE_TAG,
        FAILURE_TAG,
        ERROR_TAG,
        EXPECTED_TAG,
        ACTUAL_TAG,
        TRACE_TAG,
    ]
    .into_iter()
    .find(|tag| *tag == name)
    .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serialize::{ExportOptions, export_session},
        session::test_helpers::session_with_suite,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn finished_session() -> TestRunSession {
        let mut session = session_with_suite();
        let c1 = session.find_index("c1").unwrap();
        let c2 = session.find_index("c2").unwrap();
        session.update_case(c1, |case| {
            case.common.progress = ProgressState::Completed;
            case.common.result = TestResult::Ok;
            case.common.elapsed = Some(Duration::from_millis(250));
        });
        session.update_case(c2, |case| {
            case.common.progress = ProgressState::Completed;
            case.common.result = TestResult::Failure;
            case.common.failure = Some(
                FailureTrace::new(FailureKind::Failure)
                    .with_comparison("<3>", "")
                    .with_trace("  at divides\n  at main"),
            );
        });
        session.mark_terminal(TerminalCause::Finished, Some(Duration::from_secs(2)));
        session
    }

    #[test]
    fn round_trip_preserves_everything_compared() {
        let session = finished_session();
        let exported = export_session(&session, &ExportOptions::default()).unwrap();
        let imported = import_session(&exported).unwrap();

        let describe = |session: &TestRunSession| {
            session
                .iter()
                .map(|element| {
                    (
                        element.id().clone(),
                        element.display_name().to_owned(),
                        element.is_case(),
                        element.progress(),
                        element.result(),
                        element.failure().cloned(),
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(describe(&imported), describe(&session));
        assert_eq!(imported.counters(), session.counters());
        assert_eq!(imported.terminal_cause(), Some(TerminalCause::Finished));
        assert_eq!(imported.elapsed(), Some(Duration::from_secs(2)));
        imported.check_consistency().unwrap();

        let reexported = export_session(&imported, &ExportOptions::default()).unwrap();
        assert_eq!(reexported, exported);
    }

    #[test]
    fn unrooted_suite_is_restored() {
        let input = indoc! {r##"
            <testrun name="run" progress="running" result="undefined" tests="1" started="1" failures="0" errors="0" ignored="0">
                <testsuite id="#unrooted" name="Unrooted Tests" progress="running" result="undefined">
                    <testcase id="c9" name="c9" classname="" progress="running" result="undefined"/>
                </testsuite>
            </testrun>
        "##};
        let session = import_session(input).unwrap();
        let unrooted = session.unrooted_suite().unwrap();
        assert_eq!(unrooted.child_indexes().len(), 1);
        assert!(session.is_running());
    }

    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" tests="0" started="0" failures="0" errors="0" ignored="0"><testgroup/></testrun>"#;
        "unknown tag"
    )]
    #[test_case(r#"<testsuite id="s" name="S" progress="running" result="ok"/>"#; "suite as root")]
    fn unknown_element_kind(input: &str) {
        let err = import_session(input).unwrap_err();
        assert!(
            matches!(
                err,
                ImportError::UnknownElementKind { .. } | ImportError::MalformedDocument { .. }
            ),
            "{err:?}"
        );
    }

    #[test]
    fn unknown_tag_is_reported_by_name() {
        let input = r#"<testrun name="r" progress="running" result="undefined" tests="0" started="0" failures="0" errors="0" ignored="0"><testgroup/></testrun>"#;
        match import_session(input) {
            Err(ImportError::UnknownElementKind { tag }) => assert_eq!(tag, "testgroup"),
            other => panic!("expected UnknownElementKind, got {other:?}"),
        }
    }

    #[test]
    fn truncated_document_is_rejected() {
        let input = r#"<testrun name="r" progress="running" result="undefined" tests="1" started="0" failures="0" errors="0" ignored="0"><testsuite id="s" name="S" progress="running" result="undefined">"#;
        let err = import_session(input).unwrap_err();
        assert!(
            matches!(
                err,
                ImportError::MalformedDocument { .. } | ImportError::Xml(_)
            ),
            "{err:?}"
        );
    }

    #[test_case("", "document has no <testrun> element"; "empty")]
    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" started="0" failures="0" errors="0" ignored="0"/>"#,
        "<testrun> is missing required attribute `tests`";
        "missing attribute"
    )]
    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" tests="1" started="0" failures="0" errors="0" ignored="0"><testsuite id="s" name="S" progress="running" result="undefined"></testrun>"#,
        "expected </testsuite>, found </testrun>";
        "unbalanced"
    )]
    #[test_case(
        r#"<testrun name="r" progress="sideways" result="undefined" tests="0" started="0" failures="0" errors="0" ignored="0"/>"#,
        "<testrun> has invalid `progress` value `sideways`: unknown progress value `sideways`";
        "bad progress"
    )]
    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" tests="1" started="1" failures="0" errors="0" ignored="0"><testcase id="c" name="c" classname="" progress="completed" result="error"/></testrun>"#,
        "<testrun> declares 1 tests: 1 started, 0 failures, 0 errors, 0 ignored but its test cases add up to 1 tests: 1 started, 0 failures, 1 errors, 0 ignored";
        "counter mismatch"
    )]
    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" tests="1" started="0" failures="0" errors="0" ignored="0"><testcase id="c" name="c" classname="" progress="not-started" result="undefined"><testcase id="d" name="d" classname="" progress="not-started" result="undefined"/></testcase></testrun>"#,
        "<testcase> cannot be inside <testcase>";
        "case inside case"
    )]
    #[test_case(
        r#"<testrun name="r" progress="running" result="undefined" tests="0" started="0" failures="0" errors="0" ignored="0">stray</testrun>"#,
        "unexpected text inside <testrun>";
        "stray text"
    )]
    #[test_case(
        r##"<testrun name="r" progress="running" result="undefined" tests="1" started="0" failures="0" errors="0" ignored="0"><testcase id="#unrooted" name="c" classname="" progress="not-started" result="undefined"/></testrun>"##,
        "`#unrooted` must be a <testsuite> directly inside <testrun>";
        "reserved id on a case"
    )]
    fn malformed_document(input: &str, reason: &str) {
        match import_session(input) {
            Err(ImportError::MalformedDocument { reason: actual }) => assert_eq!(actual, reason),
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }
}
