// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{read_document, write_stdout};
use crate::{
    ExpectedError, Result,
    output::{OutputContext, SessionStyles},
};
use camino::Utf8PathBuf;
use clap::Args;
use itertools::{EitherOrBoth, Itertools};
use owo_colors::OwoColorize;
use runtree::serialize::normalize_document;
use std::io::Write;
use swrite::{SWrite, swriteln};

#[derive(Debug, Args)]
pub(crate) struct DiffOpts {
    /// The first session document
    #[arg(value_name = "OLD")]
    old: Utf8PathBuf,

    /// The second session document
    #[arg(value_name = "NEW")]
    new: Utf8PathBuf,
}

impl DiffOpts {
    pub(crate) fn exec(self, output: OutputContext, stdout: &mut dyn Write) -> Result<i32> {
        let old = self.normalize(&self.old)?;
        let new = self.normalize(&self.new)?;

        match render_differences(&old, &new, &output.stdout_styles()) {
            None => Ok(0),
            Some(differences) => {
                write_stdout(stdout, |stdout| stdout.write_all(differences.as_bytes()))?;
                Err(ExpectedError::DocumentsDiffer)
            }
        }
    }

    fn normalize(&self, path: &Utf8PathBuf) -> Result<String> {
        let input = read_document(path)?;
        normalize_document(&input).map_err(|err| ExpectedError::import_error(path, err))
    }
}

/// Returns the lines that differ between two normalized documents, or `None` if they're equal.
fn render_differences(old: &str, new: &str, styles: &SessionStyles) -> Option<String> {
    if old == new {
        return None;
    }

    let mut out = String::new();
    for (line_number, pair) in old.lines().zip_longest(new.lines()).enumerate() {
        let (old_line, new_line) = match pair {
            EitherOrBoth::Both(old_line, new_line) if old_line == new_line => continue,
            EitherOrBoth::Both(old_line, new_line) => (Some(old_line), Some(new_line)),
            EitherOrBoth::Left(old_line) => (Some(old_line), None),
            EitherOrBoth::Right(new_line) => (None, Some(new_line)),
        };
        swriteln!(out, "@@ line {} @@", line_number + 1);
        if let Some(old_line) = old_line {
            swriteln!(out, "{}", format!("-{old_line}").style(styles.removed));
        }
        if let Some(new_line) = new_line {
            swriteln!(out, "{}", format!("+{new_line}").style(styles.added));
        }
    }
    Some(out)
}
