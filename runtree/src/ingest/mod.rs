// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building a session from the event stream of a test process.
//!
//! [`EventIngestor`] is the synchronous state machine. [`spawn_ingestor`] runs one on a
//! background tokio task fed through a channel, and [`read_event_stream`] parses JSON lines into
//! that channel.

mod imp;
mod pump;
mod stream;

pub use imp::*;
pub use pump::*;
pub use stream::*;
