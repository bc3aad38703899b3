//! Tracing subscriber setup.
//!
//! One global subscriber, initialised once at startup. The configured level
//! acts as the default directive; `RUST_LOG` still wins when set so operators
//! can raise verbosity per-module without touching the config file.

use tracing_subscriber::EnvFilter;

use crate::error::GraphError;

pub fn init(level: &str) -> Result<(), GraphError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| GraphError::Config(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| GraphError::Config(format!("logger already initialised: {e}")))?;

    Ok(())
}
