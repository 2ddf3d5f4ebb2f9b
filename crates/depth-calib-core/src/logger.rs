//! Stderr logging for the calibration tools.
//!
//! [`init_with_level`] installs a `log` backend that prints
//! `[elapsed LEVEL module] message`. The requested level applies to the
//! `depth_calib*` crates; records from dependencies are capped at `warn`.
//! With the `tracing` feature, [`init_tracing`] installs a
//! `tracing-subscriber` with the same scoping as its default filter.

use std::fmt::Arguments;
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

/// Target prefix shared by every crate of the workspace.
const WORKSPACE_TARGET: &str = "depth_calib";

/// Default `RUST_LOG`-style directives for [`init_tracing`].
#[cfg(feature = "tracing")]
const DEFAULT_DIRECTIVES: &str = "warn,depth_calib=info,depth_calib_core=info,depth_calib_session=info";

fn is_workspace_target(target: &str) -> bool {
    target
        .split("::")
        .next()
        .is_some_and(|krate| krate.starts_with(WORKSPACE_TARGET))
}

/// Effective level for `target`: `level` for workspace crates, at most `warn` otherwise.
fn level_for(level: LevelFilter, target: &str) -> LevelFilter {
    if is_workspace_target(target) {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

fn format_line(elapsed_s: f64, level: Level, target: &str, args: &Arguments<'_>) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    format!("[{elapsed_s:8.3}s {level:>5} {module}] {args}")
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level_for(self.level, metadata.target())
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

/// Install the stderr logger; `level` applies to the `depth_calib*` crates.
///
/// Only the first call installs the logger; later calls keep its level.
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

/// Install a `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter, which shows `info` for the
/// workspace crates and `warn` for everything else. Closing spans of the
/// instrumented stages (frame step, calibration attempt, affine solve) are
/// logged with their duration.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .finish()
            .try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
