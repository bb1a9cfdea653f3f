//! Stderr logging for the calibration pipeline.
//!
//! Records from the `calib_ar*` crates pass at the requested level; records
//! from dependencies (ChESS, image codecs, OpenCV bindings) are capped at
//! `warn` so that `debug` runs stay about the pipeline itself. Each line reads
//! `[elapsed LEVEL crate] message`, elapsed from installation.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose records follow the requested level.
const OWN_CRATES: [&str; 4] = [
    "calib_ar",
    "calib_ar_core",
    "calib_ar_chessboard",
    "calib_ar_solver",
];

/// Ceiling for records from every other crate.
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

fn is_own(target: &str) -> bool {
    OWN_CRATES.contains(&crate_of(target))
}

fn threshold(level: LevelFilter, target: &str) -> LevelFilter {
    if is_own(target) {
        level
    } else {
        level.min(DEPENDENCY_LEVEL)
    }
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &std::fmt::Arguments) -> String {
    format!("[{elapsed:8.3}s {level:>5} {}] {args}", crate_of(target))
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= threshold(self.level, metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; later calls are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Parse a level name (`off`, `error`, `warn`, `info`, `debug`, `trace`),
/// case-insensitively.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse::<LevelFilter>().ok()
}

/// `EnvFilter` directive applying the same per-crate policy as the stderr logger.
pub fn filter_directive(level: LevelFilter) -> String {
    let own = level.to_string().to_lowercase();
    let mut directive = level.min(DEPENDENCY_LEVEL).to_string().to_lowercase();
    for name in OWN_CRATES {
        directive.push_str(&format!(",{name}={own}"));
    }
    directive
}

/// Install a `tracing` subscriber instead of the stderr logger.
///
/// `RUST_LOG` wins over [`filter_directive`] when set.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
