// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by runtree.

use crate::session::{ElementId, ProgressState, RunCounters, TestResult};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, fmt};
use thiserror::Error;

/// An error that occurred while inserting an element into a
/// [`TestRunSession`](crate::session::TestRunSession) tree.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The parent suite has not been declared yet.
    #[error("unknown parent suite `{parent}`")]
    UnknownParent {
        /// The parent ID that was requested.
        parent: ElementId,
    },

    /// The requested parent is a test case, which cannot have children.
    #[error("parent `{parent}` is a test case and cannot have children")]
    ParentIsCase {
        /// The parent ID that was requested.
        parent: ElementId,
    },

    /// An element with this ID already exists in the session.
    #[error("element `{id}` already exists in the session")]
    DuplicateId {
        /// The duplicated ID.
        id: ElementId,
    },

    /// The ID is reserved for an element the session creates itself.
    #[error("element ID `{id}` is reserved")]
    ReservedId {
        /// The reserved ID.
        id: ElementId,
    },
}

/// An error returned by [`EventIngestor::apply`](crate::ingest::EventIngestor::apply) for an
/// event that was not applied.
///
/// None of these are fatal: the ingestion pump logs them and moves on to the next event.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    /// A structural event arrived after the session reached a terminal state.
    #[error("session already ended, ignoring `{event}` event")]
    SessionTerminated {
        /// The kind of event that was rejected.
        event: &'static str,
    },

    /// A rerun referenced an ID that isn't a known test case.
    #[error("rerun references unknown test case `{id}`")]
    UnknownCase {
        /// The ID referenced by the rerun.
        id: ElementId,
    },

    /// The tree rejected an insertion.
    #[error("failed to update session tree")]
    Tree(#[from] TreeError),
}

/// The incrementally maintained state of a session disagrees with a full recomputation.
///
/// Returned by [`TestRunSession::check_consistency`](crate::session::TestRunSession::check_consistency).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    /// An element's progress or result differs from its recomputed value.
    #[error(
        "element `{id}` is ({}, {}) but recomputes to ({}, {})",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    Element {
        /// The element ID.
        id: ElementId,
        /// The incrementally maintained state.
        actual: (ProgressState, TestResult),
        /// The recomputed state.
        expected: (ProgressState, TestResult),
    },

    /// The session counters differ from a full traversal.
    #[error("session counters are {actual} but recount to {expected}")]
    Counters {
        /// The incrementally maintained counters.
        actual: RunCounters,
        /// The recounted counters.
        expected: RunCounters,
    },
}

/// An error that occurred while parsing a single line of the event stream.
#[derive(Debug, Error)]
#[error("malformed event on line {line}")]
pub struct EventParseError {
    line: usize,
    #[source]
    err: serde_json::Error,
}

impl EventParseError {
    pub(crate) fn new(line: usize, err: serde_json::Error) -> Self {
        Self { line, err }
    }

    /// Returns the 1-based line number of the malformed event.
    pub fn line(&self) -> usize {
        self.line
    }
}

/// An error that occurred while reading an event stream.
#[derive(Debug, Error)]
pub enum EventStreamError {
    /// Reading from the underlying stream failed.
    #[error("error reading event stream")]
    Read(#[source] std::io::Error),

    /// The ingestion task is no longer receiving events.
    #[error("ingestion task stopped receiving events after {forwarded} events")]
    ReceiverClosed {
        /// The number of events forwarded before the receiver closed.
        forwarded: usize,
    },
}

/// An error that occurred while waiting for the ingestion task to finish.
#[derive(Debug, Error)]
pub enum IngestJoinError {
    /// The ingestion task panicked or was cancelled.
    #[error("ingestion task failed")]
    Join(#[from] tokio::task::JoinError),

    /// The shared session was still referenced elsewhere after the task finished.
    #[error("ingestion state is still shared after the task finished")]
    StillShared,
}

/// An error that occurs while exporting a session.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Writing to the output failed.
    #[error("error writing session document")]
    Io(#[from] std::io::Error),

    /// The XML writer failed.
    #[error("error serializing session document")]
    Xml(#[from] quick_xml::Error),

    /// The produced document wasn't valid UTF-8.
    #[error("session document is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// An error that occurs while importing a session document.
///
/// A document either imports fully or not at all.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The document is structurally invalid.
    #[error("malformed session document: {reason}")]
    MalformedDocument {
        /// A description of the problem.
        reason: Cow<'static, str>,
    },

    /// The document contains an element tag that isn't part of the format.
    #[error("unknown element kind `<{tag}>`")]
    UnknownElementKind {
        /// The unrecognized tag.
        tag: String,
    },

    /// The XML itself could not be parsed.
    #[error("error parsing session document")]
    Xml(#[from] quick_xml::Error),
}

impl ImportError {
    pub(crate) fn malformed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
        }
    }
}

/// An error that occurred while swapping a session to or from disk.
#[derive(Debug, Error)]
pub enum SwapError {
    /// At least one registered listener can't observe a swapped-out session.
    #[error("a registered listener does not support swapped-out sessions")]
    Unsupported,

    /// The session hasn't reached a terminal state yet.
    #[error("session `{name}` is still running")]
    StillRunning {
        /// The name of the session.
        name: String,
    },

    /// Creating the swap directory failed.
    #[error("error creating swap directory `{dir}`")]
    CreateDir {
        /// The directory.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Writing the swap file failed.
    #[error("error writing swap file `{path}`")]
    Write {
        /// The swap file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Serializing the session failed.
    #[error("error serializing session to `{path}`")]
    Export {
        /// The swap file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: ExportError,
    },

    /// Reading the swap file failed.
    #[error("error reading swap file `{path}`")]
    Read {
        /// The swap file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Removing the swap file failed.
    #[error("error removing swap file `{path}`")]
    Remove {
        /// The swap file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The swap file could not be imported.
    #[error("error importing swap file `{path}`")]
    Import {
        /// The swap file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: ImportError,
    },
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse runtree config at `{}`", .config_file.as_deref().map_or("<default config>", |f| f.as_str()))]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file that failed to parse, if any.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`] that occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A key has an invalid value.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The key.
        key: &'static str,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}
