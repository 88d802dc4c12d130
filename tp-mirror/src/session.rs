//! Mirror session - orchestrates one invocation for one target.
//!
//! `update` runs backup, resolution and download, and rolls back on any failure
//! or interrupt. Only this module mutates `current`/`backup`; download workers
//! never do.

use crate::backup::{BackupCoordinator, BackupOutcome, BackupState, CleanOutcome, RestoreOutcome};
use crate::config::{Settings, TargetConfig};
use crate::download::{DownloadEngine, DownloadSummary, RemoteMapping};
use crate::fs::walker::summarize;
use crate::http::HttpFetcher;
use crate::interrupt::{CancelContext, InterruptController};
use crate::layout::MirrorLayout;
use crate::resolve::TreeResolver;
use crate::transfer::progress::format_bytes;
use crate::transfer::ProgressSink;
use crate::utils::{MirrorError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The operations a session accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Update,
    Restore,
    Clean,
}

impl FromStr for Operation {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "update" => Ok(Operation::Update),
            "restore" => Ok(Operation::Restore),
            "clean" => Ok(Operation::Clean),
            other => Err(MirrorError::Config(format!("Unknown operation: {}", other))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Update => "update",
            Operation::Restore => "restore",
            Operation::Clean => "clean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Updated(DownloadSummary),
    /// The update was interrupted and rolled back
    Interrupted(RestoreOutcome),
    Restored(RestoreOutcome),
    Cleaned(CleanOutcome),
}

pub struct MirrorSession {
    target: TargetConfig,
    layout: MirrorLayout,
    settings: Settings,
    resolver: TreeResolver,
    interrupts: InterruptController,
}

impl MirrorSession {
    pub fn new(target: TargetConfig, layout: MirrorLayout, settings: Settings) -> Self {
        Self {
            target,
            layout,
            settings,
            resolver: TreeResolver::default(),
            interrupts: InterruptController::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: TreeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn coordinator(&self) -> BackupCoordinator {
        BackupCoordinator::new(&self.layout, &self.target.name)
    }

    pub async fn run(
        &self,
        operation: Operation,
        progress: &mut dyn ProgressSink,
    ) -> Result<SessionOutcome> {
        match operation {
            Operation::Update => self.update(progress).await,
            Operation::Restore => Ok(SessionOutcome::Restored(self.coordinator().restore()?)),
            Operation::Clean => Ok(SessionOutcome::Cleaned(self.coordinator().clean()?)),
        }
    }

    /// Back up, resolve, download. Any failure or interrupt restores the backup.
    pub async fn update(&self, progress: &mut dyn ProgressSink) -> Result<SessionOutcome> {
        let coordinator = self.coordinator();
        let cancel = self.interrupts.orchestrator();

        let backup = coordinator.backup()?;
        let result = self.resolve_and_fetch(&cancel, progress).await;

        match result {
            Ok(summary) => {
                // Any backup left now would be taken for a stale one by the next update
                if coordinator.state() == BackupState::BackedUp {
                    coordinator.clean()?;
                }
                let local = self.layout.current_dir(&self.target.name);
                match summarize(&local) {
                    Ok(tree) => info!(
                        "Mirrored {} into {}: {} files, {}",
                        self.target.name,
                        local.display(),
                        tree.files,
                        format_bytes(tree.bytes)
                    ),
                    Err(e) => warn!("Unable to summarize {}: {}", local.display(), e),
                }
                Ok(SessionOutcome::Updated(summary))
            }
            Err(MirrorError::Cancelled) => {
                warn!("Update of {} interrupted", self.target.name);
                let restored = rollback(&coordinator, backup)?;
                Ok(SessionOutcome::Interrupted(restored))
            }
            Err(e) => {
                error!("Error occurred while updating {}: {}", self.target.name, e);
                if let Err(rollback_err) = rollback(&coordinator, backup) {
                    error!("Rollback of {} failed: {}", self.target.name, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn resolve_and_fetch(
        &self,
        cancel: &CancelContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadSummary> {
        let fetcher = Arc::new(HttpFetcher::new(
            &self.settings.download,
            self.target.credentials.clone(),
        )?);
        let root = &self.target.root_url;

        let files = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
            files = self.resolver.resolve(&fetcher, root) => files?,
        };

        info!("Downloading {} from {}", self.target.name, root);
        let mapping = RemoteMapping::new(root.clone(), self.layout.current_dir(&self.target.name));
        std::fs::create_dir_all(mapping.local_root())?;

        DownloadEngine::new(fetcher, &self.settings.download)
            .fetch_all(&files, &mapping, cancel, progress)
            .await
    }
}

/// Restore the backup; without one, a first mirror's partial directory is dropped
fn rollback(coordinator: &BackupCoordinator, backup: BackupOutcome) -> Result<RestoreOutcome> {
    let restored = coordinator.restore()?;
    if restored == RestoreOutcome::NothingToRestore && backup == BackupOutcome::Nothing {
        coordinator.discard_current()?;
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::walker::walk_files;
    use crate::resolve::{ListingResolver, TreeResolver};
    use crate::test_support::content_jar;
    use crate::transfer::NoProgress;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        layout: MirrorLayout,
        session: MirrorSession,
    }

    fn fixture(server: &mockito::Server) -> Fixture {
        let home = TempDir::new().unwrap();
        let layout = MirrorLayout::new(home.path());
        let target = TargetConfig::new("foo", &format!("{}/repo", server.url()), None).unwrap();
        let session = MirrorSession::new(target, layout.clone(), Settings::default());
        Fixture {
            _home: home,
            layout,
            session,
        }
    }

    async fn mock_bundle_repo(server: &mut mockito::Server, bundle_status: usize) -> Vec<mockito::Mock> {
        vec![
            server
                .mock("GET", "/repo/compositeContent.jar")
                .with_status(404)
                .create_async()
                .await,
            server
                .mock("GET", "/repo/content.jar")
                .with_status(200)
                .with_body(content_jar(&[("com.x", "1.0.0", "osgi.bundle")]))
                .create_async()
                .await,
            server
                .mock("GET", "/repo/artifacts.jar")
                .with_status(200)
                .with_body("artifacts")
                .create_async()
                .await,
            server
                .mock("GET", "/repo/plugins/com.x_1.0.0.jar")
                .with_status(bundle_status)
                .with_body("bundle")
                .create_async()
                .await,
        ]
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("update".parse::<Operation>().unwrap(), Operation::Update);
        assert_eq!("restore".parse::<Operation>().unwrap(), Operation::Restore);
        assert_eq!("clean".parse::<Operation>().unwrap(), Operation::Clean);
        assert!(matches!("sync".parse::<Operation>(), Err(MirrorError::Config(_))));
    }

    #[tokio::test]
    async fn test_update_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_bundle_repo(&mut server, 200).await;
        let f = fixture(&server);

        let outcome = f.session.run(Operation::Update, &mut NoProgress).await.unwrap();

        let current = f.layout.current_dir("foo");
        assert!(matches!(outcome, SessionOutcome::Updated(summary) if summary.files == 3));
        assert_eq!(fs::read(current.join("plugins/com.x_1.0.0.jar")).unwrap(), b"bundle");
        assert!(current.join("content.jar").exists());
        assert!(current.join("artifacts.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_successful_update_drops_backup() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_bundle_repo(&mut server, 200).await;
        let f = fixture(&server);
        fs::create_dir_all(f.layout.current_dir("foo")).unwrap();
        fs::write(f.layout.current_dir("foo").join("old.jar"), b"old").unwrap();

        f.session.run(Operation::Update, &mut NoProgress).await.unwrap();
        assert!(!f.layout.current_dir("foo").join("old.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());

        let outcome = f.session.run(Operation::Restore, &mut NoProgress).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Restored(RestoreOutcome::NothingToRestore));
        assert!(f.layout.current_dir("foo").join("plugins/com.x_1.0.0.jar").exists());
    }

    #[tokio::test]
    async fn test_failed_update_after_good_one_keeps_latest_mirror() {
        let mut server = mockito::Server::new_async().await;
        let good = mock_bundle_repo(&mut server, 200).await;
        let f = fixture(&server);
        let current = f.layout.current_dir("foo");
        fs::create_dir_all(&current).unwrap();
        fs::write(current.join("old.jar"), b"old").unwrap();

        f.session.run(Operation::Update, &mut NoProgress).await.unwrap();
        drop(good);

        let _failing = mock_bundle_repo(&mut server, 500).await;
        assert!(f.session.run(Operation::Update, &mut NoProgress).await.is_err());

        assert_eq!(fs::read(current.join("plugins/com.x_1.0.0.jar")).unwrap(), b"bundle");
        assert!(!current.join("old.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_failed_first_update_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_bundle_repo(&mut server, 500).await;
        let f = fixture(&server);

        let err = f.session.run(Operation::Update, &mut NoProgress).await.unwrap_err();

        assert!(matches!(err, MirrorError::Download { .. }));
        assert!(!f.layout.current_dir("foo").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_failed_update_restores_previous_mirror() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_bundle_repo(&mut server, 500).await;
        let f = fixture(&server);
        let current = f.layout.current_dir("foo");
        fs::create_dir_all(current.join("plugins")).unwrap();
        fs::write(current.join("plugins/old_0.9.jar"), b"old").unwrap();

        assert!(f.session.run(Operation::Update, &mut NoProgress).await.is_err());

        assert_eq!(fs::read(current.join("plugins/old_0.9.jar")).unwrap(), b"old");
        assert!(!current.join("content.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_resolution_error_restores() {
        let mut server = mockito::Server::new_async().await;
        let _composite = server
            .mock("GET", "/repo/compositeContent.jar")
            .with_status(404)
            .create_async()
            .await;
        let _content = server
            .mock("GET", "/repo/content.jar")
            .with_status(200)
            .with_body(content_jar(&[("com.x", "1.0.0", "mystery")]))
            .create_async()
            .await;
        let f = fixture(&server);
        fs::create_dir_all(f.layout.current_dir("foo")).unwrap();
        fs::write(f.layout.current_dir("foo").join("keep.jar"), b"keep").unwrap();

        let err = f.session.run(Operation::Update, &mut NoProgress).await.unwrap_err();
        assert!(matches!(err, MirrorError::UnknownClassifier { .. }));
        assert!(f.layout.current_dir("foo").join("keep.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_interrupted_update_rolls_back() {
        let server = mockito::Server::new_async().await;
        let f = fixture(&server);
        fs::create_dir_all(f.layout.current_dir("foo")).unwrap();
        fs::write(f.layout.current_dir("foo").join("keep.jar"), b"keep").unwrap();

        f.session.interrupts().interrupt();
        let outcome = f.session.run(Operation::Update, &mut NoProgress).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Interrupted(RestoreOutcome::Restored));
        assert!(f.layout.current_dir("foo").join("keep.jar").exists());
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_interrupt_during_download_restores() {
        let mut server = mockito::Server::new_async().await;
        let _composite = server
            .mock("GET", "/repo/compositeContent.jar")
            .with_status(404)
            .create_async()
            .await;
        let _content = server
            .mock("GET", "/repo/content.jar")
            .with_status(200)
            .with_body(content_jar(&[("com.x", "1.0.0", "osgi.bundle")]))
            .create_async()
            .await;
        let _artifacts = server
            .mock("GET", "/repo/artifacts.jar")
            .with_status(200)
            .with_body("artifacts")
            .create_async()
            .await;
        let _bundle = server
            .mock("GET", "/repo/plugins/com.x_1.0.0.jar")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"first chunk")?;
                w.flush()?;
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(b"never seen")
            })
            .create_async()
            .await;
        let f = fixture(&server);
        let current = f.layout.current_dir("foo");
        fs::create_dir_all(&current).unwrap();
        fs::write(current.join("keep.jar"), b"keep").unwrap();

        let partial = current.join("plugins/com.x_1.0.0.jar.part");
        let interrupter = async {
            tokio::time::timeout(Duration::from_secs(10), async {
                while !partial.exists() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("bundle download never started");
            f.session.interrupts().interrupt();
        };

        let mut progress = NoProgress;
        let (outcome, ()) = tokio::join!(
            f.session.run(Operation::Update, &mut progress),
            interrupter
        );

        assert_eq!(
            outcome.unwrap(),
            SessionOutcome::Interrupted(RestoreOutcome::Restored)
        );
        let files: Vec<_> = walk_files(&current)
            .unwrap()
            .into_iter()
            .map(|file| file.relative_path)
            .collect();
        assert_eq!(files, vec![PathBuf::from("keep.jar")]);
        assert_eq!(fs::read(current.join("keep.jar")).unwrap(), b"keep");
        assert!(!f.layout.backup_dir("foo").exists());
    }

    #[tokio::test]
    async fn test_listing_only_update() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/repo/")
            .with_status(200)
            .with_body(r#"<tr class="odd"><td><a href="tool.bin">t</a></td></tr><tr class="even"><td><a href="tool.md5">m</a></td></tr>"#)
            .create_async()
            .await;
        let _file = server
            .mock("GET", "/repo/tool.bin")
            .with_status(200)
            .with_body("binary")
            .create_async()
            .await;
        let f = fixture(&server);
        let session = f
            .session
            .with_resolver(TreeResolver::new(vec![Box::new(ListingResolver)]));

        session.run(Operation::Update, &mut NoProgress).await.unwrap();
        let current = f.layout.current_dir("foo");
        assert_eq!(fs::read(current.join("tool.bin")).unwrap(), b"binary");
        assert!(!current.join("tool.md5").exists());
    }

    #[tokio::test]
    async fn test_clean_operation() {
        let server = mockito::Server::new_async().await;
        let f = fixture(&server);
        fs::create_dir_all(f.layout.backup_dir("foo")).unwrap();

        let outcome = f.session.run(Operation::Clean, &mut NoProgress).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cleaned(CleanOutcome::Removed));
        let outcome = f.session.run(Operation::Clean, &mut NoProgress).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cleaned(CleanOutcome::NothingToClean));
    }
}
