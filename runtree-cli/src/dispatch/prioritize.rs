// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{import_document, write_output};
use crate::Result;
use camino::Utf8PathBuf;
use clap::Args;
use runtree::{
    config::RunTreeConfig,
    prioritize::prioritize,
    serialize::export_session,
    session::TestRunSession,
};
use std::io::Write;
use tracing::{debug, info};

#[derive(Debug, Args)]
pub(crate) struct PrioritizeOpts {
    /// Session document describing the planned run
    #[arg(value_name = "PLAN")]
    plan: Utf8PathBuf,

    /// Run these tests first, in this order (CLASS::METHOD)
    #[arg(long = "test", short = 't', value_name = "NAME")]
    tests: Vec<String>,

    /// Run tests that failed in this previous session next
    #[arg(long, value_name = "DOCUMENT")]
    previous: Option<Utf8PathBuf>,

    /// Write the reordered document to this path instead of standard output
    #[arg(long, short, value_name = "PATH")]
    output: Option<Utf8PathBuf>,
}

impl PrioritizeOpts {
    pub(crate) fn exec(self, config: &RunTreeConfig, stdout: &mut dyn Write) -> Result<i32> {
        let plan = import_document(&self.plan)?;
        let previous = self
            .previous
            .as_deref()
            .map(import_document)
            .transpose()?;

        let priority = priority_list(self.tests, previous.as_ref());
        debug!("prioritizing {} test names", priority.len());
        let matched = priority_matches(&plan, &priority);
        if matched < priority.len() {
            info!(
                "{matched} of {} priority tests are part of `{}`",
                priority.len(),
                plan.name()
            );
        }

        let prioritized = prioritize(&plan, &priority);
        let document = export_session(&prioritized, &config.export_options())?;
        write_output(self.output.as_deref(), &document, stdout)?;
        Ok(0)
    }
}

/// Explicitly named tests come first, followed by the failures of the previous session.
fn priority_list(tests: Vec<String>, previous: Option<&TestRunSession>) -> Vec<String> {
    let mut priority = tests;
    if let Some(previous) = previous {
        priority.extend(previous.failed_cases().map(|case| case.qualified_name()));
    }
    priority
}

fn priority_matches(plan: &TestRunSession, priority: &[String]) -> usize {
    priority
        .iter()
        .filter(|name| plan.cases().any(|case| case.qualified_name() == **name))
        .count()
}
