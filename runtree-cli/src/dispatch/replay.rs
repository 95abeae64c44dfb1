// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::write_output;
use crate::{ExpectedError, Result, output::OutputContext};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use owo_colors::OwoColorize;
use runtree::{
    config::RunTreeConfig,
    ingest::{EventIngestor, StreamStats, read_event_stream, spawn_ingestor},
    listener::{ListenerSet, SessionListener},
    serialize::export_session,
    session::{TestCaseElement, TestRunSession},
};
use std::io::Write;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Args)]
pub(crate) struct ReplayOpts {
    /// File to read events from, or `-` for standard input
    #[arg(value_name = "EVENTS")]
    input: Utf8PathBuf,

    /// Name of the session [default: the input file's stem]
    #[arg(long)]
    name: Option<String>,

    /// Write the session document to this path instead of standard output
    #[arg(long, short, value_name = "PATH")]
    output: Option<Utf8PathBuf>,

    /// Swap the finished session out to the configured swap directory
    #[arg(long)]
    swap: bool,
}

impl ReplayOpts {
    pub(crate) fn exec(
        self,
        config: &RunTreeConfig,
        output: OutputContext,
        stdout: &mut dyn Write,
    ) -> Result<i32> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeCreateError { err })?;

        let mut listeners = ListenerSet::new();
        listeners.add(LogListener);
        let ingestor = EventIngestor::new(self.session_name(), listeners, config.ingest_options());

        let (ingestor, stats) = runtime.block_on(ingest_input(&self.input, ingestor))?;
        if stats.skipped > 0 {
            warn!(
                "skipped {} malformed {}",
                stats.skipped,
                if stats.skipped == 1 { "line" } else { "lines" }
            );
        }

        let session = ingestor.session();
        if let Err(err) = session.check_consistency() {
            warn!("{err}");
        }
        if !session.is_terminal() {
            warn!("event stream ended before the session did");
        }

        let document = export_session(session, &config.export_options())?;
        write_output(self.output.as_deref(), &document, stdout)?;

        if self.swap {
            match config.swap_store() {
                Some(store) => {
                    let swapped = ingestor.swap_out(&store)?;
                    info!("swapped session out to {}", swapped.path());
                }
                None => warn!("--swap was passed, but no swap directory is configured"),
            }
        }

        print_summary(session, output);
        if session.result().is_failure() {
            Err(ExpectedError::TestRunFailed)
        } else {
            Ok(0)
        }
    }

    fn session_name(&self) -> String {
        match (&self.name, self.input.file_stem()) {
            (Some(name), _) => name.clone(),
            (None, Some(stem)) if self.input.as_str() != "-" => stem.to_owned(),
            (None, _) => "session".to_owned(),
        }
    }
}

async fn ingest_input(
    input: &Utf8Path,
    ingestor: EventIngestor,
) -> Result<(EventIngestor, StreamStats)> {
    if input.as_str() == "-" {
        ingest(ingestor, BufReader::new(tokio::io::stdin())).await
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .map_err(|err| ExpectedError::input_open_error(input, err))?;
        ingest(ingestor, BufReader::new(file)).await
    }
}

async fn ingest<R>(ingestor: EventIngestor, reader: R) -> Result<(EventIngestor, StreamStats)>
where
    R: AsyncBufRead + Unpin,
{
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let task = spawn_ingestor(ingestor, receiver);
    let stats = read_event_stream(reader, &sender).await;
    // Let the task drain the channel and finish even if reading failed.
    drop(sender);
    let ingestor = task.join().await?;
    Ok((ingestor, stats?))
}

fn print_summary(session: &TestRunSession, output: OutputContext) {
    let styles = output.stderr_styles();
    let counters = session.counters();
    let cause = session
        .terminal_cause()
        .map_or("incomplete", |cause| cause.as_str());
    info!(
        "{} {}: {} ({cause})",
        session.name().style(styles.bold),
        session.result().style(styles.for_result(session.result())),
        counters,
    );
}

/// Logs test outcomes as they are ingested.
struct LogListener;

impl SessionListener for LogListener {
    fn session_started(&mut self, session: &TestRunSession) {
        debug!(
            "session `{}` started, expecting {} tests",
            session.name(),
            session.expected_count()
        );
    }

    fn test_case_finished(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        if case.result().is_failure() {
            info!("{} {}", case.result().as_str().to_uppercase(), case.qualified_name());
        } else {
            debug!("{} {}", case.result(), case.qualified_name());
        }
    }

    fn test_case_reran(&mut self, _session: &TestRunSession, case: &TestCaseElement) {
        info!("RERAN {}: {}", case.qualified_name(), case.result());
    }

    fn supports_swapped_sessions(&self) -> bool {
        true
    }
}
