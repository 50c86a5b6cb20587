//! Shared configuration and classification types for the Edge Stack installer.

pub mod config;
pub mod model;
pub mod util;

pub use config::*;
pub use model::*;
pub use util::{log_snippet, program_path, wrap_text, WRAP_WIDTH};
