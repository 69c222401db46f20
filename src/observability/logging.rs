//! Structured logging.
//!
//! Log level comes from `RUST_LOG` and falls back to [`DEFAULT_FILTER`].
//! JSON output is meant for production log aggregation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "pilot=info,tower_http=info";

/// Install the global subscriber. Later calls are ignored.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
