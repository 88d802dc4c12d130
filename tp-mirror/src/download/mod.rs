//! Parallel download of a resolved file set.
//!
//! The file set is split into contiguous, near-equal jobs, one per worker. Each
//! worker fetches its files in order and reports over a bounded channel to a
//! single aggregator running on the orchestrating task:
//! - one `Completed` report per downloaded file
//! - exactly one `WorkerDone` per worker that finishes its job
//! - one `Failed` report on the first error, after which that worker stops
//!
//! The first failure (or an interrupt) aborts every remaining worker. Nothing is
//! removed here; rolling back is the backup coordinator's job.

pub mod partition;

use crate::config::DownloadSettings;
use crate::http::HttpFetcher;
use crate::interrupt::CancelContext;
use crate::resolve::FileSet;
use crate::transfer::{FileProgress, ProgressSink};
use crate::utils::{MirrorError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use url::Url;

pub use partition::partition;

/// Maps remote file URLs onto the local mirror by swapping the root prefix
#[derive(Debug, Clone)]
pub struct RemoteMapping {
    remote_root: Url,
    local_root: PathBuf,
}

impl RemoteMapping {
    pub fn new(remote_root: Url, local_root: impl Into<PathBuf>) -> Self {
        Self {
            remote_root,
            local_root: local_root.into(),
        }
    }

    pub fn local_root(&self) -> &PathBuf {
        &self.local_root
    }

    /// Local path of a remote file
    pub fn local_path(&self, url: &Url) -> Result<PathBuf> {
        let relative = url
            .as_str()
            .strip_prefix(self.remote_root.as_str())
            .ok_or_else(|| {
                MirrorError::Resolution(format!(
                    "{} is outside of the mirrored root {}",
                    url, self.remote_root
                ))
            })?;
        let relative = relative
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let mut path = self.local_root.clone();
        for segment in relative.split('/') {
            let segment = urlencoding::decode(segment).map_err(|e| {
                MirrorError::Resolution(format!("Undecodable path in {}: {}", url, e))
            })?;
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
                return Err(MirrorError::Resolution(format!(
                    "{} does not map to a file path",
                    url
                )));
            }
            path.push(&*segment);
        }
        Ok(path)
    }
}

/// The contiguous slice of the file set assigned to one worker
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub worker: usize,
    pub files: Vec<(Url, PathBuf)>,
}

/// Signal sent from a worker to the aggregator
#[derive(Debug)]
pub enum ProgressReport {
    Completed {
        worker: usize,
        count: usize,
        bytes: u64,
    },
    WorkerDone {
        worker: usize,
    },
    Failed {
        worker: usize,
        url: Url,
        error: MirrorError,
    },
}

/// Totals of a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub files: usize,
    pub bytes: u64,
    pub workers: usize,
}

pub struct DownloadEngine {
    fetcher: Arc<HttpFetcher>,
    workers: usize,
    channel_capacity: usize,
}

impl DownloadEngine {
    pub fn new(fetcher: Arc<HttpFetcher>, settings: &DownloadSettings) -> Self {
        Self {
            fetcher,
            workers: settings.worker_count(),
            channel_capacity: settings.channel_capacity.max(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Download every file of the set below the mapping's local root
    pub async fn fetch_all(
        &self,
        files: &FileSet,
        mapping: &RemoteMapping,
        cancel: &CancelContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadSummary> {
        let entries = files
            .iter()
            .map(|url| mapping.local_path(url).map(|path| (url.clone(), path)))
            .collect::<Result<Vec<_>>>()?;

        let ranges = partition(entries.len(), self.workers);
        progress.start(entries.len());
        if ranges.is_empty() {
            progress.finish();
            return Ok(DownloadSummary::default());
        }

        info!(
            "Downloading {} files with {} workers into {}",
            entries.len(),
            ranges.len(),
            mapping.local_root().display()
        );

        let pool = cancel.worker_scope();
        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        let mut workers = JoinSet::new();
        let worker_count = ranges.len();

        for (worker, range) in ranges.into_iter().enumerate() {
            let job = DownloadJob {
                worker,
                files: entries[range].to_vec(),
            };
            workers.spawn(run_worker(
                job,
                Arc::clone(&self.fetcher),
                tx.clone(),
                pool.clone(),
            ));
        }
        drop(tx);

        let result = aggregate(&mut rx, worker_count, entries.len(), cancel, progress).await;

        match result {
            Ok(summary) => {
                join_workers(&mut workers).await;
                progress.finish();
                Ok(summary)
            }
            Err(e) => {
                pool.cancel();
                workers.abort_all();
                join_workers(&mut workers).await;
                progress.abandon();
                Err(e)
            }
        }
    }
}

/// Wait for every worker task to end, logging panics. Returns the number that panicked.
async fn join_workers(workers: &mut JoinSet<()>) -> usize {
    let mut panicked = 0;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("Download worker aborted"),
            Err(e) => {
                panicked += 1;
                error!("Download worker panicked: {}", e);
            }
        }
    }
    panicked
}

/// Consume reports until every worker is done, a worker fails or the session is interrupted
async fn aggregate(
    rx: &mut mpsc::Receiver<ProgressReport>,
    worker_count: usize,
    total: usize,
    cancel: &CancelContext,
    sink: &mut dyn ProgressSink,
) -> Result<DownloadSummary> {
    let mut progress = FileProgress::new(total);
    let mut bytes = 0u64;
    let mut done = 0usize;

    while done < worker_count {
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
            report = rx.recv() => report,
        };

        match report {
            Some(ProgressReport::Completed { count, bytes: n, .. }) => {
                progress.record(count);
                bytes += n;
                sink.advance(count);
            }
            Some(ProgressReport::WorkerDone { worker }) => {
                done += 1;
                debug!("Worker {} finished ({}/{})", worker, done, worker_count);
            }
            Some(ProgressReport::Failed { worker, url, error }) => {
                error!("Worker {} failed on {}: {}", worker, url, error);
                return Err(MirrorError::Download {
                    url: url.to_string(),
                    cause: error.to_string(),
                });
            }
            None => {
                return Err(MirrorError::Network(format!(
                    "{} of {} download workers stopped without reporting",
                    worker_count - done,
                    worker_count
                )));
            }
        }
    }

    if progress.completed != total {
        return Err(MirrorError::Network(format!(
            "workers reported {} of {} files",
            progress.completed, total
        )));
    }

    Ok(DownloadSummary {
        files: progress.completed,
        bytes,
        workers: worker_count,
    })
}

/// Fetch the job's files in order. On interrupt, stop without cleanup.
async fn run_worker(
    job: DownloadJob,
    fetcher: Arc<HttpFetcher>,
    tx: mpsc::Sender<ProgressReport>,
    cancel: CancelContext,
) {
    let worker = job.worker;

    for (url, path) in job.files {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Worker {} interrupted", worker);
                return;
            }
            result = fetcher.download_to(&url, &path) => result,
        };

        match result {
            Ok(bytes) => {
                debug!("Worker {} fetched {}", worker, url);
                let report = ProgressReport::Completed {
                    worker,
                    count: 1,
                    bytes,
                };
                if tx.send(report).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                let _ = tx.send(ProgressReport::Failed { worker, url, error }).await;
                return;
            }
        }
    }

    let _ = tx.send(ProgressReport::WorkerDone { worker }).await;
}
