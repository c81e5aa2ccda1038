use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LOG_VAR;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a stderr subscriber filtered by `WAR_LAUNCHER_LOG` (default `warn`).
///
/// Stdout is left alone: it belongs to the banner and then to the runtime.
/// Calling this more than once is harmless.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
