//! Tracing setup: console output plus an optional log file per run.

use anyhow::Context;
use flightbot_core::config::{LogRotation, LoggingConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins when set; otherwise `--verbose` forces debug.
fn filter(level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(level)
        }
    })
}

pub fn init_console(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter("info", verbose))
        .init();
}

/// `flights-<dd-mm-YYYY_HH-MM-SS>.log`, one per run.
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("flights-{}.log", now.format("%d-%m-%Y_%H-%M-%S"))
}

/// Install the run subscriber. The returned guard flushes the file writer
/// and must stay alive until the run ends.
pub fn init_run(config: &LoggingConfig, dir: &Path, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = if config.file {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let name = log_file_name(chrono::Local::now());
        let appender = match config.rotation {
            LogRotation::Never => rolling::never(dir, name),
            LogRotation::Daily => rolling::daily(dir, name),
            LogRotation::Hourly => rolling::hourly(dir, name),
        };
        let (writer, guard) = non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let console_layer = config.console.then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter(&config.level, verbose))
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
