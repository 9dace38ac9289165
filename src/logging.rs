//! Structured logging and tracing for Horae
//!
//! Console and daily-rotated file output through `tracing-subscriber`, with
//! per-layer levels and a component-scoped [`StructuredLogger`].

use crate::config::LoggingConfig;
use crate::error::{HoraeError, Result};
use std::path::Path;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod state;
mod structured;

pub use level::{min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger};

/// Initialize logging system based on configuration.
///
/// Only the first call installs a subscriber; later calls return the outcome
/// of that first attempt.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    state::INIT_ONCE.call_once(|| {
        if let Err(e) = install(config) {
            let _ = state::INIT_ERROR.set(e.to_string());
        }
    });

    match state::INIT_ERROR.get() {
        Some(err) => Err(HoraeError::config(err.clone())),
        None => Ok(()),
    }
}

fn install(config: &LoggingConfig) -> Result<()> {
    let base_level = parse_log_level(&config.level)?;
    let console_level = override_or(config.console_level.as_deref(), base_level);
    let file_level = override_or(config.file_level.as_deref(), base_level);
    let filter = build_env_filter(min_level(console_level, file_level));

    if should_use_console_only() {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer(config.json_format, console_level))
            .try_init()
            .map_err(|e| HoraeError::config(format!("Failed to install subscriber: {}", e)))?;
        info!(
            "Logging initialized - console_level: {:?}, console-only",
            console_level
        );
        return Ok(());
    }

    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("horae")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| HoraeError::io(format!("Failed to create log file appender: {}", e)))?;

    let (writer, guard) = non_blocking(file_appender);
    let _ = state::LOG_GUARD.set(guard);

    let file_layer = {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false);
        if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(file_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(file_level))
                .boxed()
        }
    };

    let console = config
        .console_output
        .then(|| console_layer(config.json_format, console_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console)
        .try_init()
        .map_err(|e| HoraeError::config(format!("Failed to install subscriber: {}", e)))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level, file_level, config.file
    );
    Ok(())
}

fn override_or(level: Option<&str>, fallback: Level) -> Level {
    level
        .and_then(|s| parse_log_level(s).ok())
        .unwrap_or(fallback)
}

fn console_layer<S>(json: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        base.json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        base.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("horae={},tower_http=info,reqwest=warn", level.as_str().to_lowercase()).into()
    })
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("HORAE_DISABLE_FILE_LOG").is_some()
}

/// A configured file path logs into its parent directory; a bare directory is used as-is
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}
