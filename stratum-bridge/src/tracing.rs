//! Logging setup for the bridge.
//!
//! The binary calls [`init_journald_or_stdout`] once at startup. Library code
//! logs through `use crate::tracing::prelude::*`.

use std::{env, fmt};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{DefaultFields, Writer},
        time::FormatTime,
    },
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "stratum_bridge::";

/// Parse `JOURNAL_STREAM`, which systemd sets to `<device>:<inode>` of the
/// stream it attached to stderr.
fn parse_journal_stream(value: &str) -> Option<(u64, u64)> {
    let (dev, ino) = value.split_once(':')?;
    Some((dev.parse().ok()?, ino.parse().ok()?))
}

/// Whether stderr is still the journal stream systemd handed us, rather than
/// something a child inherited the variable through.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    use std::os::unix::io::AsRawFd;

    let Some((dev, ino)) = env::var("JOURNAL_STREAM")
        .ok()
        .and_then(|v| parse_journal_stream(&v))
    else {
        return false;
    };

    match nix::sys::stat::fstat(std::io::stderr().as_raw_fd()) {
        Ok(stat) => stat.st_dev as u64 == dev && stat.st_ino as u64 == ino,
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn stderr_is_journal_stream() -> bool {
    false
}

/// Log to journald when running as a systemd service, otherwise to stdout.
pub fn init_journald_or_stdout() {
    if stderr_is_journal_stream() {
        match tracing_journald::layer() {
            Ok(layer) => {
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(layer)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable ({e}), logging to stdout"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .fmt_fields(DefaultFields::new())
                .event_format(LineFormatter),
        )
        .init();

    debug!("Logging to stdout.");
}

// RUST_LOG wins; otherwise INFO.
fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// One line per event: time, colored level, short target, message, then
/// dimmed `key=value` fields.
struct LineFormatter;

#[derive(Default)]
struct Fields {
    message: Option<String>,
    pairs: Vec<(&'static str, String)>,
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.pairs.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.pairs.push((field.name(), value));
        }
    }
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("\x1b[31m", "ERROR"),
        Level::WARN => ("\x1b[33m", "WARN "),
        Level::INFO => ("\x1b[32m", "INFO "),
        Level::DEBUG => ("\x1b[34m", "DEBUG"),
        Level::TRACE => ("\x1b[35m", "TRACE"),
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = Fields::default();
        event.record(&mut fields);

        LocalTimer.format_time(&mut writer)?;

        let (color, label) = level_style(*event.metadata().level());
        write!(
            writer,
            " {color}{label}\x1b[0m {}: ",
            short_target(event.metadata().target())
        )?;

        if let Some(message) = &fields.message {
            write!(writer, "{message}")?;
        }

        if !fields.pairs.is_empty() {
            write!(writer, "\x1b[90m")?;
            for (key, value) in &fields.pairs {
                write!(writer, " {key}={value}")?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

// Local wall-clock time to the second; the default timer is a long UTC
// timestamp.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(w, "{formatted}")
    }
}
