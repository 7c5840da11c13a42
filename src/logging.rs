//! File-backed tracing setup.
//!
//! The terminal belongs to the conversation, so diagnostics only go to the
//! file named by `TDD_RELAY_LOG`.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "tdd_relay=debug,manager_ami=debug,info"
    } else {
        "tdd_relay=info,manager_ami=info,warn"
    }
}

/// Installs the global subscriber. Returns `Ok(false)` when no log file is
/// configured or a subscriber was already installed.
pub fn init(config: &EnvConfig) -> io::Result<bool> {
    let Some(path) = config.log_path.as_deref() else {
        return Ok(false);
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    // RUST_LOG wins over the built-in defaults.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config.debug)));

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            debug = config.debug,
            "tdd-relay starting"
        );
    }
    Ok(installed)
}
