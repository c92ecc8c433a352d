//! Logging setup
//!
//! The library only emits `tracing` events; the binary decides where they go.
//! Default filter is `mftindex=info`, overridable through `RUST_LOG`.

use crate::error::Result;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "mftindex=info";
const VERBOSE_FILTER: &str = "mftindex=debug";

/// Install the global subscriber.
///
/// Events go to stderr, or to `log_file` (appended, no colors) when given.
/// Calling it twice is harmless; the first subscriber stays.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init();
        }
        None => {
            let console_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
        }
    }

    Ok(())
}

/// Write a separator line for readability
pub fn separator(label: &str) {
    info!("========== {} ==========", label);
}
