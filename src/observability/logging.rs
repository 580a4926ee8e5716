//! # Structured Logging
//!
//! Logs go to stderr so credential output on stdout can be piped cleanly.
//! `RUST_LOG` always wins over the `--debug` default.

use tracing_subscriber::{fmt, EnvFilter};

/// Log line format selected with `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Create a tracing span covering the life of one lease.
///
/// ```rust,ignore
/// let span = lease_span!(lease.lease_id(), lease.credential().kind());
/// let span = lease_span!(lease.lease_id(), kind, path = %path);
/// ```
#[macro_export]
macro_rules! lease_span {
    ($lease_id:expr, $kind:expr) => {
        tracing::info_span!("lease", lease_id = %$lease_id, kind = %$kind)
    };
    ($lease_id:expr, $kind:expr, $($field:tt)*) => {
        tracing::info_span!("lease", lease_id = %$lease_id, kind = %$kind, $($field)*)
    };
}

fn env_filter(debug: bool) -> EnvFilter {
    let default_level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. A subscriber that is already set (tests) is left alone.
pub fn init_logging(debug: bool, format: LogFormat) {
    let builder = fmt().with_env_filter(env_filter(debug)).with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.with_target(debug).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already set, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_span_macro() {
        let _span = lease_span!("aws/creds/oncall/abc", "cloud-identity");
        let _span = lease_span!("aws/creds/oncall/abc", "cloud-identity", path = "aws/creds/oncall");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(false, LogFormat::Text);
        init_logging(true, LogFormat::Json);
    }
}
