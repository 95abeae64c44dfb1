// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! A live model of one test run.
//!
//! A test-executing process emits an ordered stream of [events](events::SessionEvent). The
//! [ingestor](ingest::EventIngestor) turns them into a [`TestRunSession`](session::TestRunSession)
//! tree whose progress, results and counters are kept up to date after every event, and notifies
//! [listeners](listener::SessionListener) as tests start and finish.
//!
//! A finished session can be [prioritized](prioritize::prioritize) so that previously failing
//! tests run first next time, [persisted](serialize) as an XML document and read back, or
//! [swapped out](swap) to disk.

pub mod config;
pub mod errors;
pub mod events;
pub mod ingest;
pub mod listener;
pub mod prioritize;
pub mod serialize;
pub mod session;
pub mod swap;
