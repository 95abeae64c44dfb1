// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted by a test-executing process.
//!
//! Events arrive one per line as JSON objects, tagged by an `event` field:
//!
//! * `{ "event": "session-started", "expected-count": <n>, "name"?: "<name>", "timestamp"?: "<rfc3339>" }`
//! * `{ "event": "suite-declared", "id": "<id>", "name": "<name>", "parent"?: "<id>", "wrapper"?: <bool> }`
//! * `{ "event": "test-declared", "id": "<id>", "class-name": "<class>", "method-name": "<method>", "parent": "<id>" }`
//! * `{ "event": "test-started", "id": "<id>", "class-name"?: "<class>", "method-name"?: "<method>" }`
//! * `{ "event": "test-ended", "id": "<id>", "elapsed"?: <seconds> }`
//! * `{ "event": "test-failed", "id": "<id>", "failure": { "kind": "failure" | "error", ... }, "elapsed"?: <seconds> }`
//! * `{ "event": "test-ignored", "id": "<id>", "elapsed"?: <seconds> }`
//! * `{ "event": "test-reran", "id": "<id>", "status": "ok" | "failure" | "error", "failure"?: { ... } }`
//! * `{ "event": "session-stopped" }`, `{ "event": "session-terminated" }`
//! * `{ "event": "session-finished", "elapsed"?: <seconds> }`
//!
//! Events for a given ID arrive in the order start → (rerun)* → end, and declarations precede
//! any event that references the declared ID.

use crate::session::{ElementId, FailureKind, FailureTrace, TestResult};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single event in the stream produced by a test-executing process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum SessionEvent {
    /// The run started.
    SessionStarted {
        /// The number of tests the process expects to run.
        expected_count: usize,
        /// A name for the run, replacing the session's name if present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// When the run started.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<FixedOffset>>,
    },

    /// A suite (or decorator wrapper) was declared.
    SuiteDeclared {
        /// The suite ID.
        id: ElementId,
        /// The display name.
        name: String,
        /// The parent suite, or `None` for a top-level suite.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<ElementId>,
        /// True if this is a single-child decorator wrapper.
        #[serde(default, skip_serializing_if = "is_false")]
        wrapper: bool,
    },

    /// A test case was declared.
    TestDeclared {
        /// The case ID.
        id: ElementId,
        /// The declaring class.
        class_name: String,
        /// The method name.
        method_name: String,
        /// The parent suite.
        parent: ElementId,
    },

    /// A test case started.
    TestStarted {
        /// The case ID.
        id: ElementId,
        /// The declaring class, used if the case wasn't declared.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class_name: Option<String>,
        /// The method name, used if the case wasn't declared.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method_name: Option<String>,
    },

    /// A test case finished. Unless a failure was reported for it, it passed.
    TestEnded {
        /// The case ID.
        id: ElementId,
        /// How long the case took.
        #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
        elapsed: Option<Duration>,
    },

    /// A test case (or a suite as a whole) failed.
    TestFailed {
        /// The case or suite ID.
        id: ElementId,
        /// The failure.
        failure: FailureTrace,
        /// How long the case took.
        #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
        elapsed: Option<Duration>,
    },

    /// A test case was ignored.
    TestIgnored {
        /// The case ID.
        id: ElementId,
        /// How long the case took.
        #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
        elapsed: Option<Duration>,
    },

    /// A single test case was run again after the fact.
    TestReran {
        /// The case ID.
        id: ElementId,
        /// The outcome of the rerun.
        status: RerunStatus,
        /// Details about the failure, if the rerun failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<FailureTrace>,
    },

    /// The user asked for the run to stop.
    SessionStopped,

    /// The test process went away abnormally.
    SessionTerminated,

    /// The run completed normally.
    SessionFinished {
        /// How long the run took.
        #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
        elapsed: Option<Duration>,
    },
}

impl SessionEvent {
    /// Parses an event from a single line of JSON.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Serializes this event as a single line of JSON.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the wire name of this event's kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session-started",
            Self::SuiteDeclared { .. } => "suite-declared",
            Self::TestDeclared { .. } => "test-declared",
            Self::TestStarted { .. } => "test-started",
            Self::TestEnded { .. } => "test-ended",
            Self::TestFailed { .. } => "test-failed",
            Self::TestIgnored { .. } => "test-ignored",
            Self::TestReran { .. } => "test-reran",
            Self::SessionStopped => "session-stopped",
            Self::SessionTerminated => "session-terminated",
            Self::SessionFinished { .. } => "session-finished",
        }
    }

    /// Returns true if this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SessionStopped | Self::SessionTerminated | Self::SessionFinished { .. }
        )
    }
}

/// The outcome of a rerun.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerunStatus {
    /// The test passed.
    Ok,
    /// An assertion failed.
    Failure,
    /// An unexpected error was raised.
    Error,
}

impl RerunStatus {
    /// Returns the failure kind for this status, or `None` if it passed.
    pub fn failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::Ok => None,
            Self::Failure => Some(FailureKind::Failure),
            Self::Error => Some(FailureKind::Error),
        }
    }

    /// Returns the result a rerun with this status produces.
    pub fn to_result(self) -> TestResult {
        match self.failure_kind() {
            Some(kind) => kind.to_result(),
            None => TestResult::Ok,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Serializes an optional duration as fractional seconds.
mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub(super) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
