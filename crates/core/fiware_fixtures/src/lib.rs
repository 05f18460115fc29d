//! Fixtures of the validation scenarios: templates, device tables and standard resources
mod error;
mod loader;
mod standard;

pub use error::*;
pub use loader::*;
pub use standard::*;
