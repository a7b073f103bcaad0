//! Opt-in tracing subscriber setup for applications embedding the crate.
//!
//! The library itself only emits structured `tracing` events; it never
//! configures a global subscriber on its own. Applications that do not
//! already have one can call [`init`] (or [`init_with_file`]) once at
//! startup.

use std::{env, path::Path};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing to stdout.
///
/// Filter comes from `RUST_LOG`, defaulting to "info". Output is pretty
/// console text, or JSON when `OMXCTL_LOG_FORMAT=json`.
///
/// # Errors
/// Returns error if a global subscriber is already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = env::var("OMXCTL_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_target(true).with_level(true))
                .try_init()?;
        }
        _ => {
            registry
                .with(fmt::layer().pretty().with_target(true).with_level(true))
                .try_init()?;
        }
    }

    Ok(())
}

/// Initialize tracing to stdout and a daily-rolling log file in `log_dir`.
///
/// # Errors
/// Returns error if the log file cannot be created or a global subscriber
/// is already installed.
pub fn init_with_file(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    const DAYS_TO_KEEP: usize = 7;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .max_log_files(DAYS_TO_KEEP)
        .filename_prefix("omxctl")
        .filename_suffix("log")
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leak the guard so the writer outlives this call; logging runs for
    // the process lifetime anyway.
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_level(true)
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .try_init()?;

    Ok(())
}
