// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
mod ingest;
mod prioritize;
mod properties;
mod round_trip;
