// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command dispatch and execution.

mod diff;
mod prioritize;
mod replay;
mod show;

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Subcommand};
use runtree::{config::RunTreeConfig, serialize::import_session, session::TestRunSession};
use std::io::{self, Write};
use tracing::debug;

/// Inspect, replay and compare test run sessions.
#[derive(Debug, clap::Parser)]
#[command(
    name = "runtree",
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct RunTreeApp {
    #[clap(flatten)]
    common: CommonOpts,

    #[clap(subcommand)]
    command: Command,
}

impl RunTreeApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.common.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, stdout: &mut dyn Write) -> Result<i32> {
        let config = self.common.config_opts.make_config()?;
        match self.command {
            Command::Replay(opts) => opts.exec(&config, output, stdout),
            Command::Show(opts) => opts.exec(output, stdout),
            Command::Prioritize(opts) => opts.exec(&config, stdout),
            Command::Diff(opts) => opts.exec(output, stdout),
        }
    }
}

#[derive(Debug, Args)]
struct CommonOpts {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: .config/runtree.toml if it exists]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self) -> Result<RunTreeConfig> {
        let default_path = Utf8Path::new(RunTreeConfig::CONFIG_PATH);
        let config_file = match &self.config_file {
            Some(path) => Some(path.as_path()),
            None if default_path.is_file() => Some(default_path),
            None => None,
        };
        debug!(
            "reading config from {}",
            config_file.map_or("<default config>", Utf8Path::as_str)
        );
        Ok(RunTreeConfig::from_sources(config_file)?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a session from a stream of test events
    ///
    /// Events are read as newline-delimited JSON, one event per line. The resulting session is
    /// written as a session document.
    Replay(replay::ReplayOpts),

    /// Print a session document as a tree
    Show(show::ShowOpts),

    /// Reorder a session so that chosen tests run first
    Prioritize(prioritize::PrioritizeOpts),

    /// Check whether two session documents describe the same run
    ///
    /// Timings, traces and formatting are not compared.
    Diff(diff::DiffOpts),
}

// ---
// Helpers shared by commands
// ---

fn read_document(path: &Utf8Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| ExpectedError::input_read_error(path, err))
}

fn import_document(path: &Utf8Path) -> Result<TestRunSession> {
    let input = read_document(path)?;
    import_session(&input).map_err(|err| ExpectedError::import_error(path, err))
}

/// Writes `contents` to `path` atomically, or to `stdout` if there is no path.
fn write_output(path: Option<&Utf8Path>, contents: &str, stdout: &mut dyn Write) -> Result<()> {
    match path {
        Some(path) => atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(contents.as_bytes()))
            .map_err(|err| {
                let err = match err {
                    atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => err,
                };
                ExpectedError::write_error(Some(path.to_owned()), err)
            }),
        None => write_stdout(stdout, |stdout| stdout.write_all(contents.as_bytes())),
    }
}

fn write_stdout(
    stdout: &mut dyn Write,
    f: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> Result<()> {
    f(stdout)
        .and_then(|()| stdout.flush())
        .map_err(|err| ExpectedError::write_error(None, err))
}
