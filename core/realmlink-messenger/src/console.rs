//! Console forwarding between a sandbox and its host.
//!
//! The sandbox side renders console arguments with [`pretty_print`] and
//! forwards them as `log` requests; uncaught errors travel as `error`
//! requests. The host side collects both and mirrors them into tracing.

use crate::error::MessengerResult;
use crate::messenger::{Messenger, Registration};
use realmlink_types::pretty_print;
use realmlink_types::protocol::{ErrorReport, Log, LogRecord, ReportError};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Depth used when rendering console arguments.
const CONSOLE_DEPTH: usize = 2;

/// Sandbox-side console forwarder.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    messenger: Messenger,
}

impl ConsoleReporter {
    pub fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }

    /// Forwards one console line built from `args`.
    pub async fn log(&self, args: &[Value]) -> MessengerResult<()> {
        let message = args
            .iter()
            .map(|arg| pretty_print(arg, CONSOLE_DEPTH))
            .collect::<Vec<_>>()
            .join(" ");
        self.messenger.send::<Log>(LogRecord { message }).await
    }

    /// Forwards an uncaught error.
    pub async fn error(&self, report: ErrorReport) -> MessengerResult<()> {
        self.messenger.send::<ReportError>(report).await
    }
}

/// An entry received by a [`ConsoleCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEntry {
    Log(String),
    Error(ErrorReport),
}

/// Host-side console sink.
#[derive(Debug)]
pub struct ConsoleCollector {
    entries: Arc<Mutex<Vec<ConsoleEntry>>>,
    _log: Registration,
    _error: Registration,
}

impl ConsoleCollector {
    /// Starts answering `log` and `error` requests on `messenger`.
    pub fn attach(messenger: &Messenger, token: &CancellationToken) -> Self {
        let entries = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&entries);
        let log = messenger.respond_to::<Log, _, _, Infallible>(
            move |record: LogRecord| {
                let sink = Arc::clone(&sink);
                async move {
                    info!(target: "realmlink::console", "{}", record.message);
                    push(&sink, ConsoleEntry::Log(record.message));
                    Ok(())
                }
            },
            token,
        );

        let sink = Arc::clone(&entries);
        let error = messenger.respond_to::<ReportError, _, _, Infallible>(
            move |report: ErrorReport| {
                let sink = Arc::clone(&sink);
                async move {
                    match (&report.src, report.line, report.column) {
                        (Some(src), Some(line), Some(column)) => {
                            warn!(target: "realmlink::console", %src, line, column, "{}", report.message)
                        }
                        _ => warn!(target: "realmlink::console", "{}", report.message),
                    }
                    push(&sink, ConsoleEntry::Error(report));
                    Ok(())
                }
            },
            token,
        );

        Self {
            entries,
            _log: log,
            _error: error,
        }
    }

    /// Everything received so far.
    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets collected entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn push(sink: &Mutex<Vec<ConsoleEntry>>, entry: ConsoleEntry) {
    sink.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}
