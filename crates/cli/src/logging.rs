//! Process-wide log setup.
//!
//! Lines look like `[2026-10-19 14:03:07,512][SYS_TEST][INFO] Run tool`.

use chrono::Local;
use std::fmt;
use tracing::field::Field;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S,%3f";

#[derive(Debug, Default, Clone, Copy)]
pub struct SysTestFormat;

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for SysTestFormat
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
        let meta = event.metadata();
        write!(
            writer,
            "[{}][{}][{}] ",
            Local::now().format(TIMESTAMP),
            meta.target(),
            level_name(meta.level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Only the message is printed; lines carry no `key=value` tail.
fn message_only(writer: &mut Writer<'_>, field: &Field, value: &dyn fmt::Debug) -> fmt::Result {
    if field.name() == "message" {
        write!(writer, "{value:?}")
    } else {
        Ok(())
    }
}

/// `-d` forces debug; otherwise `RUST_LOG` wins over the `info` default.
pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .fmt_fields(format::debug_fn(message_only))
        .event_format(SysTestFormat)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(level: &str, f: impl FnOnce()) -> String {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(level))
            .with_writer(out.clone())
            .with_ansi(false)
            .fmt_fields(format::debug_fn(message_only))
            .event_format(SysTestFormat)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn line_layout() {
        let s = capture("info", || tracing::info!(target: "SYS_TEST", "Run tool"));
        assert!(s.ends_with("][SYS_TEST][INFO] Run tool\n"), "got {s:?}");
        let b = s.as_bytes();
        assert_eq!(b[0], b'[');
        assert_eq!(b[5], b'-');
        assert_eq!(b[20], b',');
        assert_eq!(b[24], b']');
    }

    #[test]
    fn warn_is_spelled_out() {
        let s = capture("info", || tracing::warn!(target: "SYS_TEST", "slow"));
        assert!(s.contains("[SYS_TEST][WARNING] slow"));
    }

    #[test]
    fn debug_hidden_at_info() {
        let s = capture("info", || tracing::debug!(target: "SYS_TEST", "spawned"));
        assert!(s.is_empty());
        let s = capture("debug", || tracing::debug!(target: "SYS_TEST", "spawned"));
        assert!(s.contains("[DEBUG] spawned"));
    }

    #[test]
    fn fields_are_not_appended() {
        let s = capture("info", || {
            tracing::info!(target: "SYS_TEST", case = "tool_topics", pid = 42, "Run tool")
        });
        assert!(!s.contains('\x1b'), "got {s:?}");
        assert!(s.ends_with("][SYS_TEST][INFO] Run tool\n"), "got {s:?}");
    }
}
