//! Log sinks for a single run: console plus an optional per-run file.
//!
//! Nothing here installs itself implicitly. [`build_dispatch`] returns a
//! [`Dispatch`] that the binary may register globally and that the library
//! components accept through their `with_dispatch` builders.

use crate::{ArchiveError, Result};
use chrono::Local;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RUN_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// `timestamp LEVEL : message`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} {} : ",
            Local::now().format(TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("seqarchive=debug")
        } else {
            EnvFilter::new("seqarchive=info")
        }
    })
}

/// Per-run log file location: `<dir>/<YYYYmmdd-HHMMSS>_<label>.log`.
pub fn log_file_path(dir: &Path, label: &str) -> PathBuf {
    let stamp = Local::now().format(RUN_STAMP_FORMAT);
    dir.join(format!("{}_{}.log", stamp, label))
}

/// Build the console (and optionally file) subscriber without installing it.
pub fn build_dispatch(verbose: bool, log_file: Option<&Path>) -> Result<Dispatch> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ArchiveError::from_io(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ArchiveError::from_io(path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .event_format(LineFormat)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(tracing_subscriber::fmt::layer().event_format(LineFormat))
        .with(file_layer);

    Ok(Dispatch::new(subscriber))
}

/// Build the run's subscriber and register it as the process default.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Dispatch> {
    let dispatch = build_dispatch(verbose, log_file)?;
    tracing::dispatcher::set_global_default(dispatch.clone())
        .map_err(|e| ArchiveError::Logging(e.to_string()))?;
    Ok(dispatch)
}

/// The dispatcher in effect for the calling thread.
pub fn current_dispatch() -> Dispatch {
    tracing::dispatcher::get_default(|dispatch| dispatch.clone())
}
