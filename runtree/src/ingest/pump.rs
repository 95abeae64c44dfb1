// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::EventIngestor;
use crate::{
    errors::{DisplayErrorChain, IngestJoinError},
    events::SessionEvent,
    session::TestRunSession,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing::debug;

/// Runs `ingestor` on a background task, applying every event received on `receiver`.
///
/// Events are applied one at a time, in the order they were sent. The task finishes once every
/// sender has been dropped and the channel is drained.
///
/// Must be called from within a tokio runtime.
pub fn spawn_ingestor(
    ingestor: EventIngestor,
    mut receiver: UnboundedReceiver<SessionEvent>,
) -> IngestTask {
    let shared = Arc::new(Mutex::new(ingestor));
    let task_shared = shared.clone();

    let handle = tokio::spawn(async move {
        let mut applied = 0usize;
        while let Some(event) = receiver.recv().await {
            let mut ingestor = lock(&task_shared);
            if let Err(err) = ingestor.apply(event) {
                debug!("{}", DisplayErrorChain::new(err));
            }
            applied += 1;
        }

        let ingestor = lock(&task_shared);
        match ingestor.session().check_consistency() {
            Ok(()) => debug!("ingested {applied} events, session is consistent"),
            Err(err) => debug!("ingested {applied} events, but {err}"),
        }
    });

    IngestTask { shared, handle }
}

/// A handle to a running ingestion task.
///
/// Returned by [`spawn_ingestor`].
#[derive(Debug)]
pub struct IngestTask {
    shared: Arc<Mutex<EventIngestor>>,
    handle: JoinHandle<()>,
}

impl IngestTask {
    /// Returns a consistent copy of the session as it currently stands.
    ///
    /// The copy is taken between events, never halfway through one.
    pub fn snapshot(&self) -> TestRunSession {
        lock(&self.shared).session().clone()
    }

    /// Returns true if the task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to finish, returning the ingestor.
    pub async fn join(self) -> Result<EventIngestor, IngestJoinError> {
        self.handle.await?;
        let mutex = Arc::try_unwrap(self.shared).map_err(|_| IngestJoinError::StillShared)?;
        Ok(mutex
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

// A listener that panics is caught inside the ingestor, so a poisoned lock only means a panic
// escaped elsewhere; the session itself is still consistent between events.
fn lock(shared: &Mutex<EventIngestor>) -> MutexGuard<'_, EventIngestor> {
    shared
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
