// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Elements of a test run tree.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt, str::FromStr, time::Duration};

/// The identifier of an element, unique within a session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(SmolStr);

impl ElementId {
    /// The reserved ID of the session root.
    pub const SESSION: &'static str = "#session";

    /// The reserved ID of the unrooted-tests suite.
    pub const UNROOTED: &'static str = "#unrooted";

    /// Creates a new `ElementId`.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Returns the ID as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(SmolStr::from(id))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The position of an element in a session's arena.
///
/// Indexes are only meaningful for the session that produced them (and sessions cloned from it).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    /// The index of the session root.
    pub const ROOT: NodeIndex = NodeIndex(0);
}

/// The progress of an element through a run.
///
/// Progress only ever moves forward: `NotStarted` → `Running` → `Completed`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ProgressState {
    /// Nothing under this element has started.
    #[default]
    NotStarted,
    /// The element, or something under it, has started.
    Running,
    /// The element and everything under it has finished.
    Completed,
}

impl ProgressState {
    /// Returns the string used for this state in session documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    /// Returns true if this state is `Completed`.
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(Self::NotStarted),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownVariant::new("progress", other)),
        }
    }
}

/// The result of an element.
///
/// Variants are ordered by severity, so the worst of a set of results is its maximum.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum TestResult {
    /// No result is known yet.
    #[default]
    Undefined,
    /// The test passed.
    Ok,
    /// The test was ignored.
    Ignored,
    /// An assertion in the test failed.
    Failure,
    /// The test raised an unexpected error.
    Error,
}

impl TestResult {
    /// Returns the string used for this result in session documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Ok => "ok",
            Self::Ignored => "ignored",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }

    /// Returns true if this result is a failure or an error.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }

    /// Returns the worst of the given results, or `Undefined` if there are none.
    pub fn worst(results: impl IntoIterator<Item = TestResult>) -> TestResult {
        results.into_iter().max().unwrap_or_default()
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undefined" => Ok(Self::Undefined),
            "ok" => Ok(Self::Ok),
            "ignored" => Ok(Self::Ignored),
            "failure" => Ok(Self::Failure),
            "error" => Ok(Self::Error),
            other => Err(UnknownVariant::new("result", other)),
        }
    }
}

/// A string that didn't match any known variant of an enum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownVariant {
    what: &'static str,
    input: String,
}

impl UnknownVariant {
    pub(crate) fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_owned(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value `{}`", self.what, self.input)
    }
}

impl std::error::Error for UnknownVariant {}

/// Whether a failing test failed an assertion or raised an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// An assertion failed.
    Failure,
    /// An unexpected error was raised.
    Error,
}

impl FailureKind {
    /// Returns the result corresponding to this kind.
    pub fn to_result(self) -> TestResult {
        match self {
            Self::Failure => TestResult::Failure,
            Self::Error => TestResult::Error,
        }
    }
}

/// Information about a failure reported for an element.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureTrace {
    /// Whether this is an assertion failure or an error.
    pub kind: FailureKind,

    /// The name of the exception type, if reported.
    #[serde(default)]
    pub exception_type: Option<String>,

    /// The expected value of a comparison failure.
    #[serde(default)]
    pub expected: Option<String>,

    /// The actual value of a comparison failure.
    #[serde(default)]
    pub actual: Option<String>,

    /// The raw trace text. Its exact contents depend on the runtime that produced it.
    #[serde(default)]
    pub trace: String,
}

impl FailureTrace {
    /// Creates a new trace of the given kind with no details.
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            exception_type: None,
            expected: None,
            actual: None,
            trace: String::new(),
        }
    }

    /// Sets the exception type.
    pub fn with_exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    /// Sets the expected and actual values of a comparison failure.
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Sets the raw trace text.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    /// Returns true if both the expected and actual values are present.
    pub fn is_comparison_failure(&self) -> bool {
        self.expected.is_some() && self.actual.is_some()
    }
}

/// The kind of a container element.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ContainerKind {
    /// The root of a session.
    Session,
    /// An ordered group of tests and other suites.
    Suite,
    /// A single-child container that only exists to attach setup and teardown to the suite it
    /// wraps.
    Wrapper,
}

/// Data shared by every kind of element.
#[derive(Clone, Debug)]
pub(crate) struct ElementCommon {
    pub(crate) index: NodeIndex,
    pub(crate) id: ElementId,
    pub(crate) display_name: String,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) progress: ProgressState,
    pub(crate) result: TestResult,
    pub(crate) failure: Option<FailureTrace>,
    pub(crate) elapsed: Option<Duration>,
}

impl ElementCommon {
    pub(crate) fn new(
        index: NodeIndex,
        id: ElementId,
        display_name: String,
        parent: Option<NodeIndex>,
    ) -> Self {
        Self {
            index,
            id,
            display_name,
            parent,
            progress: ProgressState::NotStarted,
            result: TestResult::Undefined,
            failure: None,
            elapsed: None,
        }
    }
}

/// Accessors for the data every element carries.
macro_rules! common_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Returns the index of this element within its session.
            pub fn index(&self) -> NodeIndex {
                self.common.index
            }

            /// Returns the ID of this element.
            pub fn id(&self) -> &ElementId {
                &self.common.id
            }

            /// Returns the human-readable name of this element.
            pub fn display_name(&self) -> &str {
                &self.common.display_name
            }

            /// Returns the progress of this element.
            pub fn progress(&self) -> ProgressState {
                self.common.progress
            }

            /// Returns the result of this element.
            pub fn result(&self) -> TestResult {
                self.common.result
            }

            /// Returns the failure reported for this element, if any.
            pub fn failure(&self) -> Option<&FailureTrace> {
                self.common.failure.as_ref()
            }

            /// Returns the time this element took, if reported.
            pub fn elapsed(&self) -> Option<Duration> {
                self.common.elapsed
            }
        }
    };
}

common_accessors!(TestCaseElement);
common_accessors!(TestSuiteElement);

/// A single executable test.
#[derive(Clone, Debug)]
pub struct TestCaseElement {
    pub(crate) common: ElementCommon,
    pub(crate) class_name: String,
    pub(crate) method_name: String,
}

impl TestCaseElement {
    /// Returns the name of the class (or module) declaring this test.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the name of the test method (or function).
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the fully-qualified name of this test: `class::method`, or just the method name if
    /// the class name is empty.
    ///
    /// This is the identifier matched against priority lists.
    pub fn qualified_name(&self) -> String {
        if self.class_name.is_empty() {
            self.method_name.clone()
        } else {
            format!("{}::{}", self.class_name, self.method_name)
        }
    }

    /// Returns true if this test was ignored.
    pub fn is_ignored(&self) -> bool {
        self.common.result == TestResult::Ignored
    }
}

/// An ordered container of elements.
#[derive(Clone, Debug)]
pub struct TestSuiteElement {
    pub(crate) common: ElementCommon,
    pub(crate) kind: ContainerKind,
    pub(crate) children: Vec<NodeIndex>,
}

impl TestSuiteElement {
    /// Returns the kind of container this is.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Returns the indexes of this container's children, in order.
    pub fn child_indexes(&self) -> &[NodeIndex] {
        &self.children
    }

    /// Returns true if this container is a decorator wrapper.
    pub fn is_wrapper(&self) -> bool {
        self.kind == ContainerKind::Wrapper
    }

    /// Returns the kind of the failure reported against this container itself, if any.
    pub fn own_failure(&self) -> Option<FailureKind> {
        self.common.failure.as_ref().map(|failure| failure.kind)
    }
}

/// An element in a test run tree.
#[derive(Clone, Debug)]
pub enum TestElement {
    /// A leaf: a single test.
    Case(TestCaseElement),
    /// A container: a suite, a wrapper or the session root.
    Suite(TestSuiteElement),
}

impl TestElement {
    pub(crate) fn common(&self) -> &ElementCommon {
        match self {
            Self::Case(case) => &case.common,
            Self::Suite(suite) => &suite.common,
        }
    }

    pub(crate) fn common_mut(&mut self) -> &mut ElementCommon {
        match self {
            Self::Case(case) => &mut case.common,
            Self::Suite(suite) => &mut suite.common,
        }
    }

    /// Returns the index of this element within its session.
    pub fn index(&self) -> NodeIndex {
        self.common().index
    }

    /// Returns the ID of this element.
    pub fn id(&self) -> &ElementId {
        &self.common().id
    }

    /// Returns the human-readable name of this element.
    pub fn display_name(&self) -> &str {
        &self.common().display_name
    }

    /// Returns the index of this element's parent, or `None` for the session root.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.common().parent
    }

    /// Returns the progress of this element.
    pub fn progress(&self) -> ProgressState {
        self.common().progress
    }

    /// Returns the result of this element.
    pub fn result(&self) -> TestResult {
        self.common().result
    }

    /// Returns the failure reported for this element, if any.
    pub fn failure(&self) -> Option<&FailureTrace> {
        self.common().failure.as_ref()
    }

    /// Returns the time this element took, if reported.
    pub fn elapsed(&self) -> Option<Duration> {
        self.common().elapsed
    }

    /// Returns this element as a test case, if it is one.
    pub fn as_case(&self) -> Option<&TestCaseElement> {
        match self {
            Self::Case(case) => Some(case),
            Self::Suite(_) => None,
        }
    }

    /// Returns this element as a container, if it is one.
    pub fn as_suite(&self) -> Option<&TestSuiteElement> {
        match self {
            Self::Case(_) => None,
            Self::Suite(suite) => Some(suite),
        }
    }

    /// Returns true if this element is a test case.
    pub fn is_case(&self) -> bool {
        matches!(self, Self::Case(_))
    }
}

/// An element to be inserted with
/// [`TestRunSession::add_test`](crate::session::TestRunSession::add_test).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NewElement {
    /// A test case.
    Case {
        /// The case ID.
        id: ElementId,
        /// The declaring class name.
        class_name: String,
        /// The method name, also used as the display name.
        method_name: String,
    },
    /// A container.
    Container {
        /// The container ID.
        id: ElementId,
        /// The display name.
        name: String,
        /// Whether this is a plain suite or a decorator wrapper.
        kind: ContainerKind,
    },
}

impl NewElement {
    /// Creates a new test case.
    pub fn case(
        id: impl Into<ElementId>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self::Case {
            id: id.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Creates a new suite.
    pub fn suite(id: impl Into<ElementId>, name: impl Into<String>) -> Self {
        Self::Container {
            id: id.into(),
            name: name.into(),
            kind: ContainerKind::Suite,
        }
    }

    /// Creates a new decorator wrapper.
    pub fn wrapper(id: impl Into<ElementId>, name: impl Into<String>) -> Self {
        Self::Container {
            id: id.into(),
            name: name.into(),
            kind: ContainerKind::Wrapper,
        }
    }

    /// Returns the ID of the element to be inserted.
    pub fn id(&self) -> &ElementId {
        match self {
            Self::Case { id, .. } | Self::Container { id, .. } => id,
        }
    }
}
