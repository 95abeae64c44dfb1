// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session tree.
//!
//! Elements live in an arena owned by the session and refer to each other by [`NodeIndex`].
//! Parent links are plain indexes, so the tree never forms reference cycles. An
//! `ElementId → NodeIndex` map sits alongside the arena so that events can be applied without
//! walking the tree.

use super::{
    ContainerKind, ElementCommon, ElementId, FailureTrace, NewElement, NodeIndex, ProgressState,
    TestCaseElement, TestElement, TestResult, TestSuiteElement,
    aggregate::{
        CaseTally, RunCounters, aggregate_container, aggregate_ended_container, aggregate_session,
    },
};
use crate::errors::{ConsistencyError, TreeError};
use chrono::{DateTime, FixedOffset};
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use std::{collections::HashMap, fmt, time::Duration};

/// Kind marker for session UUIDs.
pub enum SessionKind {}

impl TypedUuidKind for SessionKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("session");
        TAG
    }
}

/// A unique identifier for a session, used to name swap files.
pub type SessionUuid = TypedUuid<SessionKind>;

/// How a session reached its terminal state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TerminalCause {
    /// The run completed normally.
    Finished,
    /// The user asked for the run to stop.
    Stopped,
    /// The test process went away abnormally.
    Terminated,
}

impl TerminalCause {
    /// Returns the string used for this cause in session documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        }
    }

    pub(crate) fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "finished" => Some(Self::Finished),
            "stopped" => Some(Self::Stopped),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for TerminalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a test suite: the root of the tree, plus run-wide counters.
#[derive(Clone, Debug)]
pub struct TestRunSession {
    session_id: SessionUuid,
    name: String,
    elements: Vec<TestElement>,
    by_id: HashMap<ElementId, NodeIndex>,
    tally: CaseTally,
    expected_count: usize,
    unrooted: Option<NodeIndex>,
    started: bool,
    terminal: Option<TerminalCause>,
    elapsed: Option<Duration>,
    start_time: Option<DateTime<FixedOffset>>,
}

impl TestRunSession {
    /// Creates a new, empty session.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = TestElement::Suite(TestSuiteElement {
            common: ElementCommon::new(
                NodeIndex::ROOT,
                ElementId::new(ElementId::SESSION),
                name.clone(),
                None,
            ),
            kind: ContainerKind::Session,
            children: Vec::new(),
        });
        let mut by_id = HashMap::new();
        by_id.insert(ElementId::new(ElementId::SESSION), NodeIndex::ROOT);

        Self {
            session_id: SessionUuid::new_v4(),
            name,
            elements: vec![root],
            by_id,
            tally: CaseTally::default(),
            expected_count: 0,
            unrooted: None,
            started: false,
            terminal: None,
            elapsed: None,
            start_time: None,
        }
    }

    /// Returns the unique ID of this session.
    pub fn session_id(&self) -> SessionUuid {
        self.session_id
    }

    /// Returns the name of this session.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the session root.
    pub fn root(&self) -> &TestSuiteElement {
        match &self.elements[NodeIndex::ROOT.0] {
            TestElement::Suite(root) => root,
            TestElement::Case(_) => unreachable!("the session root is always a container"),
        }
    }

    /// Returns the element at the given index.
    ///
    /// # Panics
    ///
    /// Panics if the index doesn't belong to this session.
    pub fn element(&self, index: NodeIndex) -> &TestElement {
        &self.elements[index.0]
    }

    /// Looks up an element by ID.
    pub fn find(&self, id: &str) -> Option<&TestElement> {
        self.find_index(id).map(|index| self.element(index))
    }

    /// Looks up the index of an element by ID.
    pub fn find_index(&self, id: &str) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    /// Returns the children of the element at the given index, in order.
    ///
    /// Test cases have no children.
    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = &TestElement> + '_ {
        let children = match self.element(index) {
            TestElement::Suite(suite) => suite.children.as_slice(),
            TestElement::Case(_) => &[],
        };
        children.iter().map(|&child| self.element(child))
    }

    /// Returns the parent of the element at the given index, or `None` for the root.
    pub fn parent(&self, index: NodeIndex) -> Option<&TestElement> {
        self.element(index)
            .parent()
            .map(|parent| self.element(parent))
    }

    /// Returns the ancestors of the element at the given index, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> impl Iterator<Item = &TestElement> + '_ {
        std::iter::successors(self.parent(index), |element| {
            element.parent().map(|parent| self.element(parent))
        })
    }

    /// Iterates over every element in depth-first pre-order, starting with the root.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            session: self,
            stack: vec![NodeIndex::ROOT],
        }
    }

    /// Iterates over every test case in tree order.
    pub fn cases(&self) -> impl Iterator<Item = &TestCaseElement> + '_ {
        self.iter().filter_map(TestElement::as_case)
    }

    /// Returns every test case that failed or raised an error, in tree order.
    pub fn failed_cases(&self) -> impl Iterator<Item = &TestCaseElement> + '_ {
        self.cases().filter(|case| case.common.result.is_failure())
    }

    /// Returns the number of elements in this session, including the root.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the session contains nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.elements.len() == 1
    }

    /// Returns the session-wide counters.
    pub fn counters(&self) -> RunCounters {
        self.tally.to_counters(self.expected_count)
    }

    /// Returns the number of tests the test process announced it would run.
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Returns the progress of the session as a whole.
    pub fn progress(&self) -> ProgressState {
        self.root().common.progress
    }

    /// Returns the aggregate result of the session.
    pub fn result(&self) -> TestResult {
        self.root().common.result
    }

    /// Returns how the session ended, or `None` if it hasn't.
    pub fn terminal_cause(&self) -> Option<TerminalCause> {
        self.terminal
    }

    /// Returns true once the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Returns true if the session has started and not yet ended.
    pub fn is_running(&self) -> bool {
        self.started && self.terminal.is_none()
    }

    /// Returns the elapsed time of the run, if reported.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Returns the time the run started, if reported.
    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        self.start_time
    }

    /// Returns the synthetic suite collecting unrooted tests, if one was created.
    pub fn unrooted_suite(&self) -> Option<&TestSuiteElement> {
        self.unrooted
            .and_then(|index| self.element(index).as_suite())
    }

    /// Inserts `element` as the last child of the container `parent_id`.
    ///
    /// The parent must already exist: declarations are expected to arrive parents first.
    pub fn add_test(&mut self, parent_id: &str, element: NewElement) -> Result<NodeIndex, TreeError> {
        let parent = self
            .find_index(parent_id)
            .ok_or_else(|| TreeError::UnknownParent {
                parent: ElementId::new(parent_id),
            })?;
        if element.id().as_str() == ElementId::UNROOTED {
            return Err(TreeError::ReservedId {
                id: element.id().clone(),
            });
        }
        self.insert(parent, element)
    }

    /// Inserts `element` under `parent`, without the reserved-ID check.
    pub(crate) fn insert(
        &mut self,
        parent: NodeIndex,
        element: NewElement,
    ) -> Result<NodeIndex, TreeError> {
        if self.element(parent).is_case() {
            return Err(TreeError::ParentIsCase {
                parent: self.element(parent).id().clone(),
            });
        }
        if self.by_id.contains_key(element.id().as_str()) {
            return Err(TreeError::DuplicateId {
                id: element.id().clone(),
            });
        }

        let index = NodeIndex(self.elements.len());
        let new = match element {
            NewElement::Case {
                id,
                class_name,
                method_name,
            } => {
                self.tally
                    .add(ProgressState::NotStarted, TestResult::Undefined);
                TestElement::Case(TestCaseElement {
                    common: ElementCommon::new(index, id, method_name.clone(), Some(parent)),
                    class_name,
                    method_name,
                })
            }
            NewElement::Container { id, name, kind } => TestElement::Suite(TestSuiteElement {
                common: ElementCommon::new(index, id, name, Some(parent)),
                kind,
                children: Vec::new(),
            }),
        };

        self.by_id.insert(new.id().clone(), index);
        self.elements.push(new);
        self.suite_mut(parent).children.push(index);
        self.reaggregate_from(parent);

        Ok(index)
    }

    /// Recomputes the state of every container from scratch, bottom-up.
    ///
    /// Returns the recomputed `(progress, result)` of every element, by index. Leaves keep their
    /// own state.
    pub fn recompute_all(&self) -> Vec<(ProgressState, TestResult)> {
        let mut states: Vec<_> = self
            .elements
            .iter()
            .map(|element| (element.progress(), element.result()))
            .collect();

        // Children always come after their parents in pre-order, so walking pre-order backwards
        // visits every child before its parent.
        let order: Vec<_> = self.iter().map(TestElement::index).collect();
        for &index in order.iter().rev() {
            if let TestElement::Suite(suite) = self.element(index) {
                let state = self.aggregate_with(suite, |child| states[child.0]);
                states[index.0] = state;
            }
        }

        states
    }

    /// Verifies that the incrementally maintained state equals a full recomputation.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let recomputed = self.recompute_all();
        for element in &self.elements {
            let actual = (element.progress(), element.result());
            let expected = recomputed[element.index().0];
            if actual != expected {
                return Err(ConsistencyError::Element {
                    id: element.id().clone(),
                    actual,
                    expected,
                });
            }
        }

        let expected = self.recount().to_counters(self.expected_count);
        let actual = self.counters();
        if actual != expected {
            return Err(ConsistencyError::Counters { actual, expected });
        }
        Ok(())
    }

    // ---
    // Mutation, used by ingestion, import and prioritization
    // ---

    pub(crate) fn set_session_id(&mut self, session_id: SessionUuid) {
        self.session_id = session_id;
    }

    pub(crate) fn mark_started(
        &mut self,
        expected_count: usize,
        start_time: Option<DateTime<FixedOffset>>,
    ) {
        self.started = true;
        self.expected_count = self.expected_count.max(expected_count);
        if start_time.is_some() {
            self.start_time = start_time;
        }
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.root_mut().common.display_name = name.clone();
        self.name = name;
    }

    pub(crate) fn mark_terminal(&mut self, cause: TerminalCause, elapsed: Option<Duration>) {
        self.terminal = Some(cause);
        if elapsed.is_some() {
            self.elapsed = elapsed;
        }
        self.root_mut().common.elapsed = self.elapsed;
        // Every container with a started descendant completes, not just the root.
        let states = self.recompute_all();
        for (element, (progress, result)) in self.elements.iter_mut().zip(states) {
            let common = element.common_mut();
            common.progress = progress;
            common.result = result;
        }
    }

    /// Returns the unrooted-tests suite, creating it as the last child of the root if needed.
    pub(crate) fn ensure_unrooted_suite(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.unrooted {
            return index;
        }
        let index = self
            .insert(
                NodeIndex::ROOT,
                NewElement::suite(ElementId::UNROOTED, name),
            )
            .expect("the unrooted suite ID is reserved, so it can't already exist");
        self.unrooted = Some(index);
        index
    }

    /// Applies `f` to a test case, then updates counters and ancestors.
    ///
    /// Does nothing if `index` isn't a test case.
    pub(crate) fn update_case<F>(&mut self, index: NodeIndex, f: F)
    where
        F: FnOnce(&mut TestCaseElement),
    {
        let TestElement::Case(case) = &mut self.elements[index.0] else {
            return;
        };
        let before = (case.common.progress, case.common.result);
        f(case);
        let after = (case.common.progress, case.common.result);
        let parent = case.common.parent;

        if before != after {
            self.tally.remove(before.0, before.1);
            self.tally.add(after.0, after.1);
            if let Some(parent) = parent {
                self.reaggregate_from(parent);
            }
        }
    }

    /// Records a failure reported against a container itself.
    pub(crate) fn set_container_failure(&mut self, index: NodeIndex, failure: FailureTrace) {
        if let TestElement::Suite(suite) = &mut self.elements[index.0] {
            suite.common.failure = Some(failure);
            self.reaggregate_from(index);
        }
    }

    /// Overwrites the stored state of an element without re-aggregating.
    ///
    /// Used when importing a document, which carries the state of every element.
    /// [`Self::retally`] must be called once all elements are restored.
    pub(crate) fn restore_element(
        &mut self,
        index: NodeIndex,
        progress: ProgressState,
        result: TestResult,
        failure: Option<FailureTrace>,
        elapsed: Option<Duration>,
    ) {
        let common = self.elements[index.0].common_mut();
        common.progress = progress;
        common.result = result;
        common.failure = failure;
        common.elapsed = elapsed;
    }

    pub(crate) fn restore_run(
        &mut self,
        expected_count: usize,
        terminal: Option<TerminalCause>,
        elapsed: Option<Duration>,
        start_time: Option<DateTime<FixedOffset>>,
    ) {
        self.expected_count = expected_count;
        self.terminal = terminal;
        self.elapsed = elapsed;
        self.start_time = start_time;
        self.started = self.root().common.progress != ProgressState::NotStarted;
    }

    pub(crate) fn mark_unrooted(&mut self, index: NodeIndex) {
        self.unrooted = Some(index);
    }

    /// Recounts the counters from scratch.
    pub(crate) fn retally(&mut self) {
        self.tally = self.recount();
    }

    pub(crate) fn children_mut(&mut self, index: NodeIndex) -> Option<&mut Vec<NodeIndex>> {
        match &mut self.elements[index.0] {
            TestElement::Suite(suite) => Some(&mut suite.children),
            TestElement::Case(_) => None,
        }
    }

    // ---
    // Helper methods
    // ---

    fn root_mut(&mut self) -> &mut TestSuiteElement {
        self.suite_mut(NodeIndex::ROOT)
    }

    fn suite_mut(&mut self, index: NodeIndex) -> &mut TestSuiteElement {
        match &mut self.elements[index.0] {
            TestElement::Suite(suite) => suite,
            TestElement::Case(_) => unreachable!("caller checked that this is a container"),
        }
    }

    fn aggregate_with(
        &self,
        suite: &TestSuiteElement,
        state_of: impl Fn(NodeIndex) -> (ProgressState, TestResult),
    ) -> (ProgressState, TestResult) {
        let children = suite.children.iter().map(|&child| state_of(child));
        let ended = self.terminal.is_some();
        match suite.kind {
            ContainerKind::Session => aggregate_session(children, ended),
            ContainerKind::Suite | ContainerKind::Wrapper if ended => {
                aggregate_ended_container(children, suite.own_failure())
            }
            ContainerKind::Suite | ContainerKind::Wrapper => {
                aggregate_container(children, suite.own_failure())
            }
        }
    }

    /// Re-derives the state of `index` and its ancestors, stopping early once a container's
    /// state doesn't change.
    fn reaggregate_from(&mut self, index: NodeIndex) {
        let mut current = Some(index);
        while let Some(index) = current {
            let TestElement::Suite(suite) = self.element(index) else {
                current = self.element(index).parent();
                continue;
            };
            let state = self.aggregate_with(suite, |child| {
                let child = self.element(child);
                (child.progress(), child.result())
            });

            let common = self.elements[index.0].common_mut();
            if (common.progress, common.result) == state {
                break;
            }
            common.progress = state.0;
            common.result = state.1;
            current = common.parent;
        }
    }

    fn recount(&self) -> CaseTally {
        let mut tally = CaseTally::default();
        for case in self.cases() {
            tally.add(case.common.progress, case.common.result);
        }
        tally
    }
}

/// A depth-first pre-order iterator over a session's elements.
///
/// Returned by [`TestRunSession::iter`].
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    session: &'a TestRunSession,
    stack: Vec<NodeIndex>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TestElement;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        let element = self.session.element(index);
        if let TestElement::Suite(suite) = element {
            self.stack.extend(suite.children.iter().rev());
        }
        Some(element)
    }
}
