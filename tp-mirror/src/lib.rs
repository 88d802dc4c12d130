//! Target Platform Mirror Library
//!
//! Mirrors a remote update repository into `~/.target-platform/current/<target>`
//! and keeps the previous mirror in `backup/<target>` so a failed or interrupted
//! update can always be rolled back.

pub mod backup;
pub mod config;
pub mod download;
pub mod fs;
pub mod http;
pub mod interrupt;
pub mod layout;
pub mod resolve;
pub mod session;
pub mod transfer;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Settings, TargetConfig};
pub use session::{MirrorSession, Operation, SessionOutcome};
pub use utils::errors::MirrorError;
pub type Result<T> = std::result::Result<T, MirrorError>;
