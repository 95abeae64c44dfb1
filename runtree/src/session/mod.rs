// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test run session model.
//!
//! A [`TestRunSession`] is a tree of [`TestElement`]s rooted at the session itself. Leaves are
//! [`TestCaseElement`]s and containers are [`TestSuiteElement`]s. Progress and results roll up
//! from the leaves as tests complete; see [`aggregate_container`] for the rules.

mod aggregate;
mod element;
#[cfg(test)]
pub(crate) mod test_helpers;
mod tree;

pub use aggregate::{
    RunCounters, aggregate_container, aggregate_ended_container, aggregate_session,
};
pub use element::*;
pub use tree::{Iter, SessionKind, SessionUuid, TerminalCause, TestRunSession};
