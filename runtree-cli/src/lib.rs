// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `runtree` command-line tool.
//!
//! `runtree` replays streams of test events into session documents, shows and compares those
//! documents, and reorders planned runs so that chosen tests run first.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, LOG_ENV, OutputContext, StderrStyles};
