//! # Observability
//!
//! Structured logging setup using the tracing ecosystem. The compiler
//! itself only emits spans and events; exporters are the embedding
//! process's concern.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with an env-filter (`RUST_LOG`) and compact output.
///
/// Safe to call once per process; subsequent calls are ignored so tests can
/// initialize independently.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().compact()).try_init()
    };

    // Already-initialized is fine: tests and embedders race on this.
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing(false);
        init_tracing(false);
        init_tracing(true);
    }
}
