use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter of `info` for every brunan crate.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,brunan_core=info,brunan_api=info".into()
            })
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
