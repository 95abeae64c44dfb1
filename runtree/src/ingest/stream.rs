// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{DisplayErrorChain, EventParseError, EventStreamError},
    events::SessionEvent,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::UnboundedSender,
};
use tracing::warn;

/// Statistics about an event stream, returned by [`read_event_stream`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StreamStats {
    /// The number of events forwarded to the ingestion task.
    pub forwarded: usize,
    /// The number of malformed lines that were skipped.
    pub skipped: usize,
}

/// Reads newline-delimited JSON events from `reader` and forwards them to `sender`.
///
/// Blank lines are ignored. Malformed lines are logged and skipped, since the event source isn't
/// under our control. Reading stops at end of input.
pub async fn read_event_stream<R>(
    reader: R,
    sender: &UnboundedSender<SessionEvent>,
) -> Result<StreamStats, EventStreamError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = StreamStats::default();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await.map_err(EventStreamError::Read)? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match SessionEvent::from_json_line(line) {
            Ok(event) => event,
            Err(err) => {
                let err = EventParseError::new(line_number, err);
                warn!("skipping {}", DisplayErrorChain::new(err));
                stats.skipped += 1;
                continue;
            }
        };

        sender
            .send(event)
            .map_err(|_| EventStreamError::ReceiverClosed {
                forwarded: stats.forwarded,
            })?;
        stats.forwarded += 1;
    }

    Ok(stats)
}
