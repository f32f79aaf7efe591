//! Logging setup for devlink programs.
//!
//! A program embedding the link calls [`init_journald_or_stdout`] once at
//! startup to install a subscriber. Library code only emits events, through
//! `use crate::tracing::prelude::*`, and never installs anything itself.

use std::env;
use std::fmt;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "RUST_LOG";

/// Install a journald subscriber when started by systemd, stdout otherwise.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_err() {
        init_stdout();
        return;
    }

    match tracing_journald::layer() {
        Ok(layer) => tracing_subscriber::registry()
            .with(env_filter())
            .with(layer)
            .init(),
        Err(e) => {
            init_stdout();
            error!(error = %e, "Failed to initialize journald logging, using stdout.");
        }
    }
}

/// Log to stdout at INFO unless `RUST_LOG` says otherwise.
pub fn init_stdout() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_timer(WallClock))
        .init();
}

fn env_filter() -> EnvFilter {
    env_filter_from(env::var(LOG_ENV).ok().as_deref())
}

// INFO unless the directives say otherwise. Invalid directives are skipped.
fn env_filter_from(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

// Local wall-clock time, to the nearest second. Falls back to UTC when the
// local offset cannot be determined.
struct WallClock;

impl FormatTime for WallClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(w, "{}", stamp)
    }
}
