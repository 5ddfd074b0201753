//! Logging setup for applications embedding the cache.
//!
//! The library itself only talks to the `log` facade: hits and misses at
//! trace, reconciliation and clears at debug, degraded store operations at
//! warn. [`init_logging`] installs an `env_logger` backend for hosts that do
//! not bring their own, tagging each record with the part of the cache that
//! emitted it:
//!
//! ```text
//! 2024-05-01T10:00:00Z TRACE  cache Cache hit: music/a.mp3
//! 2024-05-01T10:00:00Z DEBUG sqlite Removed 12 rows from analysis_cache
//! ```
//!
//! `RUST_LOG` takes precedence over the `verbose`/`quiet` arguments.
//!
//! # Example
//!
//! ```rust,no_run
//! use metacache::logging::init_logging;
//!
//! // Show cache hits and misses
//! init_logging(2, false);
//! log::info!("Cache ready");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize the logging subsystem.
///
/// `verbose` counts up from info (0) to debug (1) and trace (2+); `quiet`
/// restricts output to errors. Returns `false` when a logger was already
/// installed, in which case the existing one is left untouched.
pub fn init_logging(verbose: u8, quiet: bool) -> bool {
    let mut builder = Builder::new();
    if env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_for(verbose, quiet));
    }

    builder.format(|buf, record| {
        let timestamp = buf.timestamp_seconds();
        let level = record.level();
        let level_style = buf.default_level_style(level);
        writeln!(
            buf,
            "{} {level_style}{:<5}{level_style:#} {:>6} {}",
            timestamp,
            level,
            subsystem(record.target()),
            record.args()
        )
    });

    let installed = builder.try_init().is_ok();
    if installed {
        log::debug!("Logging initialized at level: {}", current_level_name());
    }
    installed
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Short tag for a record target. Targets outside this crate pass through.
fn subsystem(target: &str) -> &str {
    let Some(module) = target.strip_prefix("metacache::") else {
        return target;
    };
    match module {
        "cache::database" => "sqlite",
        "cache::memory" => "memory",
        m if m.starts_with("cache") => "cache",
        m => m,
    }
}

/// Get the current log level as a string.
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
