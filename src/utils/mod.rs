pub mod build_info;
pub mod paths;

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static TRACING_INIT: Once = Once::new();

const DEFAULT_DIRECTIVE: &str = "ledger_core=info";

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `directive` (or `ledger_core=info`) is
/// used. An invalid directive falls back to the default.
pub fn init_tracing(directive: Option<&str>) {
    TRACING_INIT.call_once(|| {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(directive.unwrap_or(DEFAULT_DIRECTIVE))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
        };
        // Another subscriber may already be installed by the host application.
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
