//! Utility modules for the mirror tool.

pub mod errors;
pub mod logger;

pub use errors::{MirrorError, Result};
