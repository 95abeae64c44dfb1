// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observers of a test run session.
//!
//! Listeners are notified synchronously, on the ingestion task, in the order events arrive. A
//! listener must return promptly: notifications for a slow listener are never skipped or
//! reordered, so a slow listener slows down ingestion.

use crate::session::{ElementId, TestCaseElement, TestResult, TestRunSession};
use debug_ignore::DebugIgnore;
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    time::Duration,
};
use tracing::warn;

/// Receives notifications about a test run session.
///
/// Every method has a default no-op implementation, so implementors only need to override the
/// notifications they care about.
pub trait SessionListener: Send {
    /// Called when the test process reports that the run started.
    fn session_started(&mut self, _session: &TestRunSession) {}

    /// Called when the run completed normally.
    fn session_finished(&mut self, _session: &TestRunSession) {}

    /// Called when the user asked for the run to stop.
    fn session_stopped(&mut self, _session: &TestRunSession) {}

    /// Called when the test process went away abnormally.
    fn session_terminated(&mut self, _session: &TestRunSession) {}

    /// Called when a test case starts.
    fn test_case_started(&mut self, _session: &TestRunSession, _case: &TestCaseElement) {}

    /// Called when a test case completes, whatever its result.
    fn test_case_finished(&mut self, _session: &TestRunSession, _case: &TestCaseElement) {}

    /// Called when a test case is rerun after the fact.
    fn test_case_reran(&mut self, _session: &TestRunSession, _case: &TestCaseElement) {}

    /// Returns true if this listener can work with a session that has been swapped out to disk.
    ///
    /// If any registered listener returns false, the session is kept in memory.
    fn supports_swapped_sessions(&self) -> bool {
        false
    }
}

/// A notification delivered to listeners.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Notification<'a> {
    SessionStarted,
    SessionFinished,
    SessionStopped,
    SessionTerminated,
    TestCaseStarted(&'a TestCaseElement),
    TestCaseFinished(&'a TestCaseElement),
    TestCaseReran(&'a TestCaseElement),
}

impl Notification<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SessionFinished => "session_finished",
            Self::SessionStopped => "session_stopped",
            Self::SessionTerminated => "session_terminated",
            Self::TestCaseStarted(_) => "test_case_started",
            Self::TestCaseFinished(_) => "test_case_finished",
            Self::TestCaseReran(_) => "test_case_reran",
        }
    }
}

/// An ordered set of listeners.
///
/// A listener that panics is logged and skipped for that notification. Other listeners still
/// receive it, and the session is unaffected.
#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: DebugIgnore<Vec<Box<dyn SessionListener>>>,
}

impl ListenerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Listeners are notified in registration order.
    pub fn add(&mut self, listener: impl SessionListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Registers an already-boxed listener.
    pub fn add_boxed(&mut self, listener: Box<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns true if every registered listener supports swapped-out sessions.
    pub fn supports_swapped_sessions(&self) -> bool {
        self.listeners
            .iter()
            .all(|listener| listener.supports_swapped_sessions())
    }

    pub(crate) fn notify(&mut self, session: &TestRunSession, notification: Notification<'_>) {
        for (index, listener) in self.listeners.iter_mut().enumerate() {
            let res = catch_unwind(AssertUnwindSafe(|| match notification {
                Notification::SessionStarted => listener.session_started(session),
                Notification::SessionFinished => listener.session_finished(session),
                Notification::SessionStopped => listener.session_stopped(session),
                Notification::SessionTerminated => listener.session_terminated(session),
                Notification::TestCaseStarted(case) => listener.test_case_started(session, case),
                Notification::TestCaseFinished(case) => {
                    listener.test_case_finished(session, case)
                }
                Notification::TestCaseReran(case) => listener.test_case_reran(session, case),
            }));
            if let Err(payload) = res {
                warn!(
                    "listener {index} panicked in {}: {}",
                    notification.name(),
                    panic_message(&*payload),
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "(non-string panic payload)"
    }
}

/// A notification in the historical flat-log form, carrying only primitive fields.
#[derive(Clone, Debug, PartialEq)]
pub enum FlatLogEvent {
    /// The run started.
    RunStarted {
        /// The number of tests expected.
        test_count: usize,
    },
    /// The run completed normally.
    RunEnded {
        /// The elapsed time, if reported.
        elapsed: Option<Duration>,
    },
    /// The run was stopped by the user.
    RunStopped {
        /// The elapsed time, if reported.
        elapsed: Option<Duration>,
    },
    /// The test process went away.
    RunTerminated,
    /// A test started.
    TestStarted {
        /// The case ID.
        id: ElementId,
        /// The qualified name.
        name: String,
    },
    /// A test completed.
    TestEnded {
        /// The case ID.
        id: ElementId,
        /// The qualified name.
        name: String,
    },
    /// A test completed with a non-passing result. Emitted just before the matching
    /// [`FlatLogEvent::TestEnded`].
    TestFailed {
        /// `"failure"`, `"error"` or `"ignored"`.
        status: &'static str,
        /// The case ID.
        id: ElementId,
        /// The qualified name.
        name: String,
        /// The trace text, or empty.
        trace: String,
    },
    /// A test was rerun.
    TestReran {
        /// The case ID.
        id: ElementId,
        /// The declaring class.
        class_name: String,
        /// The method name.
        name: String,
        /// The result of the rerun.
        status: &'static str,
        /// The trace text, or empty.
        trace: String,
    },
}

/// Re-projects structured notifications into [`FlatLogEvent`]s.
///
/// This is the deprecated flat interface. It exists for callers that only need the historical
/// flat log; new code should implement [`SessionListener`] directly.
pub struct FlatLogAdapter<F> {
    sink: F,
}

impl<F> FlatLogAdapter<F>
where
    F: FnMut(FlatLogEvent) + Send,
{
    /// Creates a new adapter that sends every flat event to `sink`.
    pub fn new(sink: F) -> Self {
        Self { sink }
    }
}

impl<F> SessionListener for FlatLogAdapter<F>
where
    F: FnMut(FlatLogEvent) + Send,
{
    fn session_started(&mut self, session: &TestRunSession) {
        (self.sink)(FlatLogEvent::RunStarted {
            test_count: session.counters().total,
        });
    }

    fn session_finished(&mut self, session: &TestRunSession) {
        (self.sink)(FlatLogEvent::RunEnded {
            elapsed: session.elapsed(),
        });
    }

    fn session_stopped(&mut self, session: &TestRunSession) {
        (self.sink)(FlatLogEvent::RunStopped {
            elapsed: session.elapsed(),
        });
    }

    fn session_terminated(&mut self, _session: &TestRunSession) {
        (self.sink)(FlatLogEvent::RunTerminated);
    }

    fn test_case_started(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        (self.sink)(FlatLogEvent::TestStarted {
            id: case.common.id.clone(),
            name: case.qualified_name(),
        });
    }

    fn test_case_finished(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        let result = case.common.result;
        if matches!(
            result,
            TestResult::Failure | TestResult::Error | TestResult::Ignored
        ) {
            (self.sink)(FlatLogEvent::TestFailed {
                status: result.as_str(),
                id: case.common.id.clone(),
                name: case.qualified_name(),
                trace: trace_text(case),
            });
        }
        (self.sink)(FlatLogEvent::TestEnded {
            id: case.common.id.clone(),
            name: case.qualified_name(),
        });
    }

    fn test_case_reran(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        (self.sink)(FlatLogEvent::TestReran {
            id: case.common.id.clone(),
            class_name: case.class_name.clone(),
            name: case.method_name.clone(),
            status: case.common.result.as_str(),
            trace: trace_text(case),
        });
    }

    fn supports_swapped_sessions(&self) -> bool {
        // Flat events are self-contained and never refer back to the session.
        true
    }
}

fn trace_text(case: &TestCaseElement) -> String {
    case.common
        .failure
        .as_ref()
        .map(|failure| failure.trace.clone())
        .unwrap_or_default()
}
