//! Configuration module wiring for the installer.
//!
//! Keeps config types, I/O, and environment overrides in separate files.

mod config_env;
mod config_io;
mod config_types;

pub use config_env::{
    ENV_CHART_VERSION_RULE, ENV_DEBUG, ENV_HELM_REPO, ENV_IMAGE_REPOSITORY, ENV_IMAGE_TAG,
    ENV_TELEMETRY_DISABLE,
};
pub use config_io::ConfigError;
pub use config_types::*;
