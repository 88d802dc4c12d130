//! Backup/restore protocol around the local mirror directory.
//!
//! The state is derived from directory presence alone, so a crash between any two
//! operations leaves something the next run can resolve:
//!
//! | `backup/<name>` | state       |
//! |-----------------|-------------|
//! | absent          | `NoBackup`  |
//! | present         | `BackedUp`  |
//!
//! Moves are renames within the same root, which keeps them O(1) and atomic.

use crate::layout::MirrorLayout;
use crate::utils::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    NoBackup,
    BackedUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// `current/<name>` was moved to `backup/<name>`
    Moved,
    /// A stale backup was kept and the current mirror discarded
    KeptStaleBackup,
    /// Nothing to back up (first mirror of this target)
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    NothingToRestore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    Removed,
    NothingToClean,
}

/// Owns the `current`/`backup` lifecycle for one target
#[derive(Debug, Clone)]
pub struct BackupCoordinator {
    name: String,
    current: PathBuf,
    backup: PathBuf,
}

impl BackupCoordinator {
    pub fn new(layout: &MirrorLayout, name: &str) -> Self {
        Self {
            name: name.to_string(),
            current: layout.current_dir(name),
            backup: layout.backup_dir(name),
        }
    }

    pub fn state(&self) -> BackupState {
        if self.backup.exists() {
            BackupState::BackedUp
        } else {
            BackupState::NoBackup
        }
    }

    /// Prepare for an update.
    ///
    /// With a stale backup from an aborted run, the backup is the last known good
    /// state and the current mirror is disposable.
    pub fn backup(&self) -> Result<BackupOutcome> {
        match self.state() {
            BackupState::BackedUp => {
                if self.current.exists() {
                    fs::remove_dir_all(&self.current)?;
                }
                info!("Keeping existing backup for {}", self.name);
                Ok(BackupOutcome::KeptStaleBackup)
            }
            BackupState::NoBackup if self.current.exists() => {
                if let Some(parent) = self.backup.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&self.current, &self.backup)?;
                info!("Backed up {} to {}", self.name, self.backup.display());
                Ok(BackupOutcome::Moved)
            }
            BackupState::NoBackup => Ok(BackupOutcome::Nothing),
        }
    }

    /// Roll `current/<name>` back to the backup. Advisory when there is none.
    pub fn restore(&self) -> Result<RestoreOutcome> {
        match self.state() {
            BackupState::BackedUp => {
                if self.current.exists() {
                    fs::remove_dir_all(&self.current)?;
                }
                if let Some(parent) = self.current.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&self.backup, &self.current)?;
                info!("Restored backup for {}", self.name);
                Ok(RestoreOutcome::Restored)
            }
            BackupState::NoBackup => {
                warn!("No backup available for {}", self.name);
                Ok(RestoreOutcome::NothingToRestore)
            }
        }
    }

    /// Drop a partial `current/<name>` left by a failed first mirror.
    /// Returns whether anything was removed.
    pub fn discard_current(&self) -> Result<bool> {
        if !self.current.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.current)?;
        info!("Removed partial mirror for {}", self.name);
        Ok(true)
    }

    /// Remove the stored backup
    pub fn clean(&self) -> Result<CleanOutcome> {
        match self.state() {
            BackupState::BackedUp => {
                fs::remove_dir_all(&self.backup)?;
                info!("Backup for {} removed", self.name);
                Ok(CleanOutcome::Removed)
            }
            BackupState::NoBackup => {
                warn!("No backup for {} available", self.name);
                Ok(CleanOutcome::NothingToClean)
            }
        }
    }
}
