// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evicting finished sessions from memory.
//!
//! A session that has reached a terminal state can be written to disk and dropped, leaving behind
//! a small [`SwappedSession`] summary. The full session is read back with [`SwapStore::swap_in`].
//!
//! Only sessions whose listeners all support it should be swapped out; see
//! [`SessionListener::supports_swapped_sessions`](crate::listener::SessionListener::supports_swapped_sessions).

use crate::{
    errors::SwapError,
    serialize::{ExportOptions, export_session, import_session},
    session::{RunCounters, SessionUuid, TerminalCause, TestRunSession},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, io::Write};
use tracing::debug;

/// A directory holding swapped-out sessions.
#[derive(Clone, Debug)]
pub struct SwapStore {
    dir: Utf8PathBuf,
    options: ExportOptions,
}

impl SwapStore {
    /// Creates a store backed by `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            // Swap files are never read by people.
            options: ExportOptions { indent: 0 },
        }
    }

    /// Returns the directory backing this store.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Writes `session` to disk, returning a summary that can be used to read it back.
    ///
    /// The session must have reached a terminal state.
    pub fn swap_out(&self, session: &TestRunSession) -> Result<SwappedSession, SwapError> {
        let Some(terminal) = session.terminal_cause() else {
            return Err(SwapError::StillRunning {
                name: session.name().to_owned(),
            });
        };

        fs::create_dir_all(&self.dir).map_err(|err| SwapError::CreateDir {
            dir: self.dir.clone(),
            err,
        })?;

        let path = self.dir.join(format!("{}.xml", session.session_id()));
        let document = export_session(session, &self.options).map_err(|err| SwapError::Export {
            path: path.clone(),
            err,
        })?;

        atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(document.as_bytes()))
            .map_err(|err| SwapError::Write {
                path: path.clone(),
                err: match err {
                    atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => err,
                },
            })?;
        debug!("swapped out session `{}` to {path}", session.name());

        Ok(SwappedSession {
            session_id: session.session_id(),
            name: session.name().to_owned(),
            counters: session.counters(),
            terminal,
            path,
        })
    }

    /// Reads a swapped-out session back into memory.
    ///
    /// The swap file is kept, so the session can be dropped again and re-read later.
    pub fn swap_in(&self, swapped: &SwappedSession) -> Result<TestRunSession, SwapError> {
        let document = fs::read_to_string(&swapped.path).map_err(|err| SwapError::Read {
            path: swapped.path.clone(),
            err,
        })?;
        let mut session = import_session(&document).map_err(|err| SwapError::Import {
            path: swapped.path.clone(),
            err,
        })?;
        session.set_session_id(swapped.session_id);
        Ok(session)
    }

    /// Deletes the swap file of a session that is no longer needed.
    pub fn discard(&self, swapped: SwappedSession) -> Result<(), SwapError> {
        fs::remove_file(&swapped.path).map_err(|err| SwapError::Remove {
            path: swapped.path,
            err,
        })
    }
}

/// The in-memory summary of a session that was swapped out to disk.
#[derive(Clone, Debug)]
pub struct SwappedSession {
    session_id: SessionUuid,
    name: String,
    counters: RunCounters,
    terminal: TerminalCause,
    path: Utf8PathBuf,
}

impl SwappedSession {
    /// Returns the ID of the swapped-out session.
    pub fn session_id(&self) -> SessionUuid {
        self.session_id
    }

    /// Returns the name of the session.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the session counters at the time it was swapped out.
    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Returns how the session ended.
    pub fn terminal_cause(&self) -> TerminalCause {
        self.terminal
    }

    /// Returns the path of the swap file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}
