//! Configuration of the validation harness.
//!
//! The configuration is loaded once from the defaults, an optional TOML file
//! and the environment variables of the platform deployment.
mod error;
mod figment;
mod log_level;
mod settings;
mod tenant;

pub use crate::error::*;
pub use crate::figment::CONFIG_FILE_ENV;
pub use crate::figment::ENV_PREFIX;
pub use crate::log_level::*;
pub use crate::settings::*;
pub use crate::tenant::*;
