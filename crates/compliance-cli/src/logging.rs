//! Tracing initialization for the CLI.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "COMPLIANCE_QA_LOG";

const DEFAULT_FILTER: &str = "compliance_spec=info,component_compliance=info,compliance_qa=info";
const VERBOSE_FILTER: &str = "compliance_spec=debug,component_compliance=debug,compliance_qa=debug";

static INIT: Once = Once::new();

/// Install the stderr subscriber once. `COMPLIANCE_QA_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
