// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling up progress and results from leaves to the root.
//!
//! Everything here is a pure function of the states passed in. The session tree calls into it
//! when a leaf changes, walking up the ancestor chain, and when verifying itself against a full
//! recomputation.

use super::{FailureKind, ProgressState, TestResult};
use std::fmt;

/// Computes the progress and result of a container from the states of its children.
///
/// `own_failure` is a failure reported against the container itself (for example, a fixture
/// that failed before any of its tests ran). It counts as one more completed child.
///
/// * A container with no children and no failure of its own hasn't started.
/// * It is `Completed` once every child is completed, and its result is then the worst result
///   among them.
/// * It is `Running` once any child is running or completed. Until it completes its result is
///   `Undefined`.
pub fn aggregate_container(
    children: impl IntoIterator<Item = (ProgressState, TestResult)>,
    own_failure: Option<FailureKind>,
) -> (ProgressState, TestResult) {
    let mut any_child = false;
    let mut all_completed = true;
    let mut any_started = false;
    let mut worst = TestResult::Undefined;

    let own = own_failure.map(|kind| (ProgressState::Completed, kind.to_result()));
    for (progress, result) in children.into_iter().chain(own) {
        any_child = true;
        match progress {
            ProgressState::Completed => {
                any_started = true;
                worst = worst.max(result);
            }
            ProgressState::Running => {
                any_started = true;
                all_completed = false;
            }
            ProgressState::NotStarted => {
                all_completed = false;
            }
        }
    }

    if !any_child {
        (ProgressState::NotStarted, TestResult::Undefined)
    } else if all_completed {
        (ProgressState::Completed, worst)
    } else if any_started {
        (ProgressState::Running, TestResult::Undefined)
    } else {
        (ProgressState::NotStarted, TestResult::Undefined)
    }
}

/// Computes the progress and result of a container once the session has ended.
///
/// No more tests will be reported, so a container that anything ran under is `Completed`, with
/// the worst result among the children that did complete. A container where nothing started
/// stays `NotStarted`.
pub fn aggregate_ended_container(
    children: impl IntoIterator<Item = (ProgressState, TestResult)>,
    own_failure: Option<FailureKind>,
) -> (ProgressState, TestResult) {
    let own = own_failure.map(|kind| (ProgressState::Completed, kind.to_result()));
    let mut any_started = false;
    let worst = TestResult::worst(
        children
            .into_iter()
            .chain(own)
            .inspect(|(progress, _)| any_started |= *progress != ProgressState::NotStarted)
            .filter(|(progress, _)| progress.is_completed())
            .map(|(_, result)| result),
    );

    if any_started {
        (ProgressState::Completed, worst)
    } else {
        (ProgressState::NotStarted, TestResult::Undefined)
    }
}

/// Computes the progress and result of the session root.
///
/// Before the session ends the root is never `Completed`, since more tests may still be
/// reported. Once it has ended it is always `Completed`, and its result is the worst result among
/// the children that did complete.
pub fn aggregate_session(
    children: impl IntoIterator<Item = (ProgressState, TestResult)>,
    ended: bool,
) -> (ProgressState, TestResult) {
    if ended {
        return match aggregate_ended_container(children, None) {
            (ProgressState::NotStarted, result) => (ProgressState::Completed, result),
            other => other,
        };
    }

    match aggregate_container(children, None) {
        (ProgressState::Completed, result) => (ProgressState::Running, result),
        other => other,
    }
}

/// Session-wide counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunCounters {
    /// The number of test cases that have started (including those that finished).
    pub started: usize,
    /// The number of test cases expected or known, whichever is larger.
    pub total: usize,
    /// The number of test cases that failed an assertion.
    pub failures: usize,
    /// The number of test cases that raised an error.
    pub errors: usize,
    /// The number of test cases that were ignored.
    pub ignored: usize,
}

impl fmt::Display for RunCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tests: {} started, {} failures, {} errors, {} ignored",
            self.total, self.started, self.failures, self.errors, self.ignored
        )
    }
}

/// Per-leaf tallies backing [`RunCounters`].
///
/// Each leaf contributes according to its current state; changing a leaf removes its old
/// contribution and adds its new one.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct CaseTally {
    pub(crate) leaves: usize,
    pub(crate) started: usize,
    pub(crate) failures: usize,
    pub(crate) errors: usize,
    pub(crate) ignored: usize,
}

impl CaseTally {
    pub(crate) fn add(&mut self, progress: ProgressState, result: TestResult) {
        self.leaves += 1;
        if progress != ProgressState::NotStarted {
            self.started += 1;
        }
        match result {
            TestResult::Failure => self.failures += 1,
            TestResult::Error => self.errors += 1,
            TestResult::Ignored => self.ignored += 1,
            TestResult::Undefined | TestResult::Ok => {}
        }
    }

    pub(crate) fn remove(&mut self, progress: ProgressState, result: TestResult) {
        self.leaves -= 1;
        if progress != ProgressState::NotStarted {
            self.started -= 1;
        }
        match result {
            TestResult::Failure => self.failures -= 1,
            TestResult::Error => self.errors -= 1,
            TestResult::Ignored => self.ignored -= 1,
            TestResult::Undefined | TestResult::Ok => {}
        }
    }

    pub(crate) fn to_counters(self, expected_count: usize) -> RunCounters {
        RunCounters {
            started: self.started,
            total: self.leaves.max(expected_count),
            failures: self.failures,
            errors: self.errors,
            ignored: self.ignored,
        }
    }
}
