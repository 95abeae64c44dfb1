// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ElementId, NewElement, TestRunSession};

/// A session with one suite `s1` containing two cases `c1` and `c2`.
pub(crate) fn session_with_suite() -> TestRunSession {
    let mut session = TestRunSession::new("run");
    session
        .add_test(ElementId::SESSION, NewElement::suite("s1", "MathTest"))
        .unwrap();
    session
        .add_test("s1", NewElement::case("c1", "com.example.MathTest", "adds"))
        .unwrap();
    session
        .add_test("s1", NewElement::case("c2", "com.example.MathTest", "divides"))
        .unwrap();
    session
}

/// Builds a plan from a compact description: each entry is `(parent, element)`.
pub(crate) fn build_session(elements: &[(&str, NewElement)]) -> TestRunSession {
    let mut session = TestRunSession::new("plan");
    for (parent, element) in elements {
        let parent = if parent.is_empty() {
            ElementId::SESSION
        } else {
            parent
        };
        session.add_test(parent, element.clone()).unwrap();
    }
    session
}
