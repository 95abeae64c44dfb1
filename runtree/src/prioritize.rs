// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reordering a session so that priority tests come first.
//!
//! Within every container, children that contain a priority test move ahead of children that
//! don't. Among themselves they are ordered by the rank of the earliest priority test they
//! contain, with ties broken by original order. Children without a priority test keep their
//! original relative order. The rule applies at every depth, so priority tests bubble up
//! through any amount of nesting while the grouping of suites is preserved.
//!
//! Decorator wrappers need no special handling: a wrapper's rank is the rank of the suite it
//! wraps, so the ordering is the same as if the wrapper weren't there.

use crate::session::{NodeIndex, SessionUuid, TestElement, TestRunSession};
use std::collections::HashMap;

/// Returns a copy of `session` with priority tests moved first.
///
/// `priority` lists qualified test names (see
/// [`TestCaseElement::qualified_name`](crate::session::TestCaseElement::qualified_name)) in
/// priority order. Names that don't match any test are ignored. If nothing matches, the copy has
/// the same order as `session`.
///
/// The copy is a separate session, with its own session ID.
pub fn prioritize<S: AsRef<str>>(session: &TestRunSession, priority: &[S]) -> TestRunSession {
    let mut ranks_by_name = HashMap::with_capacity(priority.len());
    for (rank, name) in priority.iter().enumerate() {
        // The first occurrence of a name wins.
        ranks_by_name.entry(name.as_ref()).or_insert(rank);
    }

    let mut prioritized = session.clone();
    prioritized.set_session_id(SessionUuid::new_v4());
    if ranks_by_name.is_empty() {
        return prioritized;
    }

    let ranks = subtree_ranks(session, &ranks_by_name);
    let containers: Vec<NodeIndex> = session
        .iter()
        .filter(|element| !element.is_case())
        .map(TestElement::index)
        .collect();

    for index in containers {
        if let Some(children) = prioritized.children_mut(index) {
            // Vec::sort_by_key is stable, so ties and unranked children keep their order.
            children.sort_by_key(|child| ranks[child.0].unwrap_or(usize::MAX));
        }
    }

    prioritized
}

/// Returns a copy of `plan` in which the tests that failed in `previous` run first.
///
/// Failed tests keep the relative order they had in `previous`.
pub fn prioritize_failures_first(
    plan: &TestRunSession,
    previous: &TestRunSession,
) -> TestRunSession {
    let failed: Vec<String> = previous
        .failed_cases()
        .map(|case| case.qualified_name())
        .collect();
    prioritize(plan, &failed)
}

/// Computes, for every element, the best (lowest) rank of a priority test in its subtree.
fn subtree_ranks(
    session: &TestRunSession,
    ranks_by_name: &HashMap<&str, usize>,
) -> Vec<Option<usize>> {
    let mut ranks = vec![None; session.len()];
    let order: Vec<_> = session.iter().collect();

    // Walking pre-order backwards visits every child before its parent.
    for element in order.into_iter().rev() {
        let rank = match element {
            TestElement::Case(case) => ranks_by_name.get(case.qualified_name().as_str()).copied(),
            TestElement::Suite(suite) => suite
                .child_indexes()
                .iter()
                .filter_map(|child| ranks[child.0])
                .min(),
        };
        ranks[element.index().0] = rank;
    }

    ranks
}
