//! Logging setup.
//!
//! Development gets pretty, multi-line events with source locations.
//! Production gets one JSON object per event, flattened, with the enclosing
//! request span so every line carries its `request_id`.

use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::Environment;

/// Filter directives used when `RUST_LOG` is not set
///
/// Nonce and session lifecycle events are logged at debug level.
pub fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Development => "debug,hyper=info,reqwest=info",
        Environment::Production => "info,tower_http=info,hyper=warn,reqwest=warn",
    }
}

/// Install the global subscriber for `env`
///
/// `RUST_LOG` overrides the default directives
/// (e.g. `RUST_LOG=ole_api::auth=trace,tower_http=debug`).
pub fn init_tracing(env: &Environment) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(env)))?;

    let layer = match env {
        Environment::Development => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
        Environment::Production => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::info!(environment = ?env, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        for env in [Environment::Development, Environment::Production] {
            assert!(EnvFilter::try_new(default_directives(&env)).is_ok());
        }
    }
}
