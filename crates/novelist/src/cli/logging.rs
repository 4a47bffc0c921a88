//! Tracing subscriber setup.

use super::LogFormat;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "novelist=info";

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// command output.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
