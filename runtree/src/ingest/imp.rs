// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{IngestError, SwapError},
    events::{RerunStatus, SessionEvent},
    listener::{ListenerSet, Notification},
    session::{
        ElementId, FailureTrace, NewElement, NodeIndex, ProgressState, TerminalCause,
        TestElement, TestResult, TestRunSession,
    },
    swap::{SwapStore, SwappedSession},
};
use std::time::Duration;
use tracing::debug;

/// Options controlling how events are applied.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// The display name of the synthetic suite that collects unrooted tests.
    pub unrooted_suite_name: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            unrooted_suite_name: "Unrooted Tests".to_owned(),
        }
    }
}

/// Applies [`SessionEvent`]s to a [`TestRunSession`], notifying listeners as it goes.
///
/// The ingestor is a single-consumer state machine: events must be applied in the order the
/// test process emitted them. It is lenient about protocol irregularities: missing
/// transitions are synthesized and unknown IDs end up under the unrooted-tests suite.
#[derive(Debug)]
pub struct EventIngestor {
    session: TestRunSession,
    listeners: ListenerSet,
    options: IngestOptions,
}

impl EventIngestor {
    /// Creates a new ingestor for a fresh session with the given name.
    pub fn new(name: impl Into<String>, listeners: ListenerSet, options: IngestOptions) -> Self {
        Self::with_session(TestRunSession::new(name), listeners, options)
    }

    /// Creates a new ingestor that continues an existing session.
    ///
    /// This is typically used with a session imported from a document or swapped back in, so
    /// that reruns can be applied to it.
    pub fn with_session(
        session: TestRunSession,
        listeners: ListenerSet,
        options: IngestOptions,
    ) -> Self {
        Self {
            session,
            listeners,
            options,
        }
    }

    /// Returns the session being built.
    pub fn session(&self) -> &TestRunSession {
        &self.session
    }

    /// Returns the registered listeners.
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Consumes the ingestor, returning the session.
    pub fn into_session(self) -> TestRunSession {
        self.session
    }

    /// Writes the session to `store`, if the session has ended and every listener supports
    /// swapped-out sessions.
    pub fn swap_out(&self, store: &SwapStore) -> Result<SwappedSession, SwapError> {
        if !self.listeners.supports_swapped_sessions() {
            return Err(SwapError::Unsupported);
        }
        store.swap_out(&self.session)
    }

    /// Applies a single event.
    ///
    /// Errors are never fatal: the session is left unchanged by the rejected event and later
    /// events can still be applied.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), IngestError> {
        if self.session.is_terminal() {
            match event {
                // Reruns are allowed after the session ends.
                SessionEvent::TestReran { .. } => {}
                // So are repeated terminal events, which do nothing: the first cause wins.
                SessionEvent::SessionStopped
                | SessionEvent::SessionTerminated
                | SessionEvent::SessionFinished { .. } => {
                    debug!(
                        "ignoring `{}`: session already {}",
                        event.kind_name(),
                        self.session
                            .terminal_cause()
                            .map_or("ended", TerminalCause::as_str),
                    );
                    return Ok(());
                }
                _ => {
                    return Err(IngestError::SessionTerminated {
                        event: event.kind_name(),
                    });
                }
            }
        }

        match event {
            SessionEvent::SessionStarted {
                expected_count,
                name,
                timestamp,
            } => {
                if let Some(name) = name {
                    self.session.rename(name);
                }
                self.session.mark_started(expected_count, timestamp);
                self.notify(Notification::SessionStarted);
            }
            SessionEvent::SuiteDeclared {
                id,
                name,
                parent,
                wrapper,
            } => {
                let element = if wrapper {
                    NewElement::wrapper(id, name)
                } else {
                    NewElement::suite(id, name)
                };
                self.declare(parent.as_ref(), element)?;
            }
            SessionEvent::TestDeclared {
                id,
                class_name,
                method_name,
                parent,
            } => {
                self.declare(
                    Some(&parent),
                    NewElement::case(id, class_name, method_name),
                )?;
            }
            SessionEvent::TestStarted {
                id,
                class_name,
                method_name,
            } => {
                match self.target(&id, class_name, method_name)? {
                    Target::Case(index) => self.start_case(index),
                    Target::Container(_) => {
                        debug!("ignoring `test-started` for container `{id}`");
                    }
                }
            }
            SessionEvent::TestEnded { id, elapsed } => {
                self.complete(&id, None, elapsed)?;
            }
            SessionEvent::TestFailed {
                id,
                failure,
                elapsed,
            } => {
                self.complete(&id, Some(Completion::Failed(failure)), elapsed)?;
            }
            SessionEvent::TestIgnored { id, elapsed } => {
                self.complete(&id, Some(Completion::Ignored), elapsed)?;
            }
            SessionEvent::TestReran {
                id,
                status,
                failure,
            } => {
                self.rerun(&id, status, failure)?;
            }
            SessionEvent::SessionStopped => {
                self.terminate(TerminalCause::Stopped, None);
            }
            SessionEvent::SessionTerminated => {
                self.terminate(TerminalCause::Terminated, None);
            }
            SessionEvent::SessionFinished { elapsed } => {
                self.terminate(TerminalCause::Finished, elapsed);
            }
        }

        Ok(())
    }

    // ---
    // Helper methods
    // ---

    fn notify(&mut self, notification: Notification<'_>) {
        self.listeners.notify(&self.session, notification);
    }

    fn notify_case(&mut self, index: NodeIndex, kind: CaseNotification) {
        if let TestElement::Case(case) = self.session.element(index) {
            let notification = match kind {
                CaseNotification::Started => Notification::TestCaseStarted(case),
                CaseNotification::Finished => Notification::TestCaseFinished(case),
                CaseNotification::Reran => Notification::TestCaseReran(case),
            };
            self.listeners.notify(&self.session, notification);
        }
    }

    /// Declares a suite or case.
    ///
    /// Redeclaring an existing ID does nothing. Declarations whose parent is unknown, is a test
    /// case or has already completed end up under the unrooted suite.
    fn declare(
        &mut self,
        parent: Option<&ElementId>,
        element: NewElement,
    ) -> Result<(), IngestError> {
        let id = element.id();
        if id.as_str() == ElementId::SESSION || id.as_str() == ElementId::UNROOTED {
            debug!("ignoring declaration of reserved ID `{id}`");
            return Ok(());
        }
        if self.session.find_index(id.as_str()).is_some() {
            debug!("ignoring redeclaration of `{id}`");
            return Ok(());
        }

        let parent = match parent {
            None => NodeIndex::ROOT,
            Some(parent_id) => match self.live_parent(parent_id) {
                Some(index) => index,
                None => {
                    debug!("parent `{parent_id}` of `{id}` is not a live suite, treating as unrooted");
                    self.unrooted()
                }
            },
        };
        self.session.insert(parent, element)?;
        Ok(())
    }

    /// Returns the index of `id` if it's a container that can still accept children.
    fn live_parent(&self, id: &ElementId) -> Option<NodeIndex> {
        let index = self.session.find_index(id.as_str())?;
        match self.session.element(index) {
            TestElement::Suite(suite) if !suite.common.progress.is_completed() => Some(index),
            TestElement::Suite(_) | TestElement::Case(_) => None,
        }
    }

    fn unrooted(&mut self) -> NodeIndex {
        self.session
            .ensure_unrooted_suite(&self.options.unrooted_suite_name)
    }

    /// Looks up the target of a `test-*` event, creating a test case under the unrooted suite
    /// if the ID isn't known.
    fn target(
        &mut self,
        id: &ElementId,
        class_name: Option<String>,
        method_name: Option<String>,
    ) -> Result<Target, IngestError> {
        if let Some(index) = self.session.find_index(id.as_str()) {
            return Ok(if self.session.element(index).is_case() {
                Target::Case(index)
            } else {
                Target::Container(index)
            });
        }

        debug!("test `{id}` was never declared, adding it to the unrooted suite");
        let parent = self.unrooted();
        let element = NewElement::case(
            id.clone(),
            class_name.unwrap_or_default(),
            method_name.unwrap_or_else(|| id.to_string()),
        );
        Ok(Target::Case(self.session.insert(parent, element)?))
    }

    fn start_case(&mut self, index: NodeIndex) {
        let mut started = false;
        self.session.update_case(index, |case| {
            if case.common.progress == ProgressState::NotStarted {
                case.common.progress = ProgressState::Running;
                started = true;
            }
        });
        if started {
            self.notify_case(index, CaseNotification::Started);
        } else {
            debug!(
                "ignoring repeated start of `{}`",
                self.session.element(index).id()
            );
        }
    }

    fn complete(
        &mut self,
        id: &ElementId,
        completion: Option<Completion>,
        elapsed: Option<Duration>,
    ) -> Result<(), IngestError> {
        let index = match self.target(id, None, None)? {
            Target::Case(index) => index,
            Target::Container(index) => {
                match completion {
                    Some(Completion::Failed(failure)) => {
                        self.session.set_container_failure(index, failure);
                    }
                    Some(Completion::Ignored) | None => {
                        debug!("ignoring completion event for container `{id}`");
                    }
                }
                return Ok(());
            }
        };

        match self.session.element(index).progress() {
            ProgressState::NotStarted => {
                // A test that ends without having started is treated as started-then-ended.
                self.start_case(index);
            }
            ProgressState::Running => {}
            ProgressState::Completed => {
                // A completed test's result is final, including for late teardown failures.
                debug!("ignoring repeated completion of `{id}`");
                return Ok(());
            }
        }

        self.session.update_case(index, |case| {
            let (mut result, mut failure) = match completion {
                Some(Completion::Failed(failure)) => (failure.kind.to_result(), Some(failure)),
                Some(Completion::Ignored) => (TestResult::Ignored, None),
                None => (TestResult::Ok, None),
            };
            // A failure recorded by a rerun while the test was running still counts.
            if let Some(recorded) = case.common.failure.take() {
                let recorded_result = recorded.kind.to_result();
                if recorded_result >= result {
                    result = recorded_result;
                    failure = Some(recorded);
                }
            }
            case.common.progress = ProgressState::Completed;
            case.common.result = result;
            case.common.failure = failure;
            if elapsed.is_some() {
                case.common.elapsed = elapsed;
            }
        });
        self.notify_case(index, CaseNotification::Finished);
        Ok(())
    }

    fn rerun(
        &mut self,
        id: &ElementId,
        status: RerunStatus,
        failure: Option<FailureTrace>,
    ) -> Result<(), IngestError> {
        let index = self
            .session
            .find_index(id.as_str())
            .filter(|&index| self.session.element(index).is_case())
            .ok_or_else(|| IngestError::UnknownCase { id: id.clone() })?;

        let failure = status.failure_kind().map(|kind| match failure {
            Some(failure) => FailureTrace { kind, ..failure },
            None => FailureTrace::new(kind),
        });
        self.session.update_case(index, |case| {
            case.common.result = status.to_result();
            case.common.failure = failure;
        });
        self.notify_case(index, CaseNotification::Reran);
        Ok(())
    }

    fn terminate(&mut self, cause: TerminalCause, elapsed: Option<Duration>) {
        self.session.mark_terminal(cause, elapsed);
        let notification = match cause {
            TerminalCause::Finished => Notification::SessionFinished,
            TerminalCause::Stopped => Notification::SessionStopped,
            TerminalCause::Terminated => Notification::SessionTerminated,
        };
        self.notify(notification);
    }
}

enum Target {
    Case(NodeIndex),
    Container(NodeIndex),
}

enum Completion {
    Failed(FailureTrace),
    Ignored,
}

#[derive(Clone, Copy)]
enum CaseNotification {
    Started,
    Finished,
    Reran,
}
