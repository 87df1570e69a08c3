use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber, logging to stderr.
///
/// Stdout is reserved for sample and summary lines.
pub fn init_tracing(config: &Logging) {
    let (level, env_filter) = parse_rust_log(config.level);

    let format = match config.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Simplified => layer.with_ansi(false).compact().boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.with_ansi(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .try_init()
        .ok();
}

/// Resolves the effective level and filter from `RUST_LOG` and the configured level.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        s3bench=TRACE,\
        s3bench_service=TRACE,\
        ",
    );

    (level, env_filter)
}
