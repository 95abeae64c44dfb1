// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting sessions as XML documents.
//!
//! A document looks like:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testrun name="run" progress="completed" result="error" terminal="finished" tests="2"
//!          started="2" failures="0" errors="1" ignored="0" time="1.250">
//!     <testsuite id="s1" name="MathTest" progress="completed" result="error">
//!         <testcase id="c1" name="adds" classname="com.example.MathTest" progress="completed" result="ok"/>
//!         <testcase id="c2" name="divides" classname="com.example.MathTest" progress="completed" result="error">
//!             <error type="ArithmeticException">
//!                 <trace>division by zero</trace>
//!             </error>
//!         </testcase>
//!     </testsuite>
//! </testrun>
//! ```
//!
//! Decorator wrappers are written as `<testwrapper>`, and the unrooted-tests suite is the
//! `<testsuite>` with the reserved ID `#unrooted`. A comparison failure carries `<expected>` and
//! `<actual>` children.
//!
//! Trace text and elapsed times depend on the machine that ran the tests. Use
//! [`normalize_document`] to strip them before comparing two documents.

mod export;
mod import;
mod normalize;

pub use export::*;
pub use import::*;
pub use normalize::*;

const TESTRUN_TAG: &str = "testrun";
const TESTSUITE_TAG: &str = "testsuite";
const TESTWRAPPER_TAG: &str = "testwrapper";
const TESTCASE_TAG: &str = "testcase";
const FAILURE_TAG: &str = "failure";
const ERROR_TAG: &str = "error";
const EXPECTED_TAG: &str = "expected";
const ACTUAL_TAG: &str = "actual";
const TRACE_TAG: &str = "trace";
