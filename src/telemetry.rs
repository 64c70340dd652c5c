// Tracing setup for hosts that do not install their own subscriber.

use std::sync::OnceLock;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// [`init_tracing_with`] using `info,hyper=warn,reqwest=warn`.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_FILTER)
}

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`; an
/// unparsable `default_filter` falls back to the crate default.
///
/// Only the first call does anything. Returns whether that call installed
/// the subscriber, i.e. `false` when the host already set a global one.
pub fn init_tracing_with(default_filter: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            info!("paged fetch engine tracing installed filter={}", default_filter);
        } else {
            debug!("global tracing subscriber already present; leaving it in place");
        }
        installed
    })
}
