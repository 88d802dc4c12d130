//! On-disk layout of the mirror root.
//!
//! ```text
//! <home>/current/<target>/...   live mirror
//! <home>/backup/<target>/...    rollback copy
//! ```

use std::path::{Path, PathBuf};

const CURRENT_DIR: &str = "current";
const BACKUP_DIR: &str = "backup";

#[derive(Debug, Clone)]
pub struct MirrorLayout {
    home: PathBuf,
}

impl MirrorLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn current_root(&self) -> PathBuf {
        self.home.join(CURRENT_DIR)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.home.join(BACKUP_DIR)
    }

    /// Live mirror directory for a target
    pub fn current_dir(&self, name: &str) -> PathBuf {
        self.current_root().join(name)
    }

    /// Rollback directory for a target
    pub fn backup_dir(&self, name: &str) -> PathBuf {
        self.backup_root().join(name)
    }
}
