// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use runtree::errors::{
    ConfigParseError, EventStreamError, ExportError, ImportError, IngestJoinError, SwapError,
};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes used by runtree.
pub struct RunTreeExitCode;

impl RunTreeExitCode {
    /// The compared documents describe different runs.
    pub const DOCUMENTS_DIFFER: i32 = 1;

    /// An error occurred while setting up or reading input.
    pub const SETUP_ERROR: i32 = 96;

    /// The replayed run had a failing or erroring test.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Writing output failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that runtree knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("error opening input")]
    InputOpenError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error reading input")]
    InputReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error reading event stream")]
    EventStreamError {
        #[from]
        err: EventStreamError,
    },
    #[error("ingestion failed")]
    IngestJoinError {
        #[from]
        err: IngestJoinError,
    },
    #[error("error importing session document")]
    ImportError {
        path: Utf8PathBuf,
        #[source]
        err: ImportError,
    },
    #[error("error exporting session")]
    ExportError {
        #[from]
        err: ExportError,
    },
    #[error("error swapping out session")]
    SwapError {
        #[from]
        err: SwapError,
    },
    #[error("error creating async runtime")]
    RuntimeCreateError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing output")]
    WriteError {
        path: Option<Utf8PathBuf>,
        #[source]
        err: std::io::Error,
    },
    #[error("replayed run failed")]
    TestRunFailed,
    #[error("documents differ")]
    DocumentsDiffer,
}

impl ExpectedError {
    pub(crate) fn input_open_error(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::InputOpenError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn input_read_error(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::InputReadError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn import_error(path: impl Into<Utf8PathBuf>, err: ImportError) -> Self {
        Self::ImportError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn write_error(path: Option<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::WriteError { path, err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::InputOpenError { .. }
            | Self::InputReadError { .. }
            | Self::EventStreamError { .. }
            | Self::IngestJoinError { .. }
            | Self::ImportError { .. }
            | Self::SwapError { .. }
            | Self::RuntimeCreateError { .. } => RunTreeExitCode::SETUP_ERROR,
            Self::ExportError { .. } | Self::WriteError { .. } => {
                RunTreeExitCode::WRITE_OUTPUT_ERROR
            }
            Self::TestRunFailed => RunTreeExitCode::TEST_RUN_FAILED,
            Self::DocumentsDiffer => RunTreeExitCode::DOCUMENTS_DIFFER,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error: Option<&dyn Error> = match &self {
            Self::ConfigParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::InputOpenError { path, err } => {
                error!("error opening `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::InputReadError { path, err } => {
                error!("error reading `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::EventStreamError { err } => {
                error!("{err}");
                err.source()
            }
            Self::IngestJoinError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ImportError { path, err } => {
                error!("error importing `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::ExportError { err } => {
                error!("{err}");
                err.source()
            }
            Self::SwapError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RuntimeCreateError { err } => {
                error!("error creating async runtime");
                Some(err as &dyn Error)
            }
            Self::WriteError { path, err } => {
                match path {
                    Some(path) => error!("error writing `{}`", path.style(styles.bold)),
                    None => error!("error writing to standard output"),
                }
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                // The summary has already been printed.
                None
            }
            Self::DocumentsDiffer => {
                // The differences have already been printed.
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: "runtree::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
