//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Log format selected by `ARTFUSE_LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Read `ARTFUSE_LOG_FORMAT` (`json` selects JSON, anything else is pretty)
    pub fn from_env() -> Self {
        match std::env::var("ARTFUSE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}
