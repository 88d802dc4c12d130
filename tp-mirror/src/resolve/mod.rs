//! Resolution of a remote tree into a flat, deduplicated set of files.
//!
//! Strategies are tried in order at the root. The first one that recognizes the
//! root produces the result; later strategies only run when earlier ones report
//! [`Visit::NotApplicable`].

pub mod classifier;
pub mod listing;
pub mod metadata;

use crate::http::HttpFetcher;
use crate::utils::{MirrorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};
use url::Url;

pub use classifier::{ArtifactKey, ClassifierTable, Placement};
pub use listing::ListingResolver;
pub use metadata::MetadataResolver;

/// Remote file locations to download, unique by absolute URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeSet<Url>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the URL was already present
    pub fn insert(&mut self, url: Url) -> bool {
        self.files.insert(url)
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.files.contains(url)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.files.iter()
    }

    pub fn to_vec(&self) -> Vec<Url> {
        self.files.iter().cloned().collect()
    }
}

impl FromIterator<Url> for FileSet {
    fn from_iter<I: IntoIterator<Item = Url>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Outcome of running a strategy on a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// The folder is not in a form this strategy understands
    NotApplicable,
    /// The folder was resolved (or had already been resolved)
    Applied,
}

/// Mutable state of one resolution run, passed down the recursion
pub struct ResolveContext<'a> {
    fetcher: &'a HttpFetcher,
    root: &'a Url,
    visited: HashSet<String>,
    files: FileSet,
}

impl<'a> ResolveContext<'a> {
    pub fn new(fetcher: &'a HttpFetcher, root: &'a Url) -> Self {
        Self {
            fetcher,
            root,
            visited: HashSet::new(),
            files: FileSet::new(),
        }
    }

    pub fn fetcher(&self) -> &'a HttpFetcher {
        self.fetcher
    }

    /// Mark a folder as visited. Returns false if it was seen before.
    pub fn enter(&mut self, folder: &Url) -> bool {
        self.visited.insert(folder_key(folder))
    }

    /// Add a file to the result. Files must live below the mirrored root.
    pub fn add_file(&mut self, url: Url) -> Result<()> {
        if !url.as_str().starts_with(self.root.as_str()) {
            return Err(MirrorError::Resolution(format!(
                "{} is outside of the mirrored root {}",
                url, self.root
            )));
        }
        if !self.files.insert(url.clone()) {
            debug!("Skipping duplicate file {}", url);
        }
        Ok(())
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn into_files(self) -> FileSet {
        self.files
    }
}

/// Normalized folder identity: no query or fragment, always a trailing slash
pub fn folder_key(folder: &Url) -> String {
    let mut url = folder.clone();
    url.set_query(None);
    url.set_fragment(None);
    let mut key = url.to_string();
    if !key.ends_with('/') {
        key.push('/');
    }
    key
}

/// Join a child folder reference onto its parent, forcing a trailing slash
pub fn child_folder(parent: &Url, location: &str) -> Result<Url> {
    let mut location = location.trim().to_string();
    if !location.ends_with('/') {
        location.push('/');
    }
    Ok(parent.join(&location)?)
}

/// One way of reading a remote folder
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve `folder` and everything below it into `ctx`
    async fn resolve_folder(&self, ctx: &mut ResolveContext<'_>, folder: &Url) -> Result<Visit>;
}

/// Which strategies to try
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Metadata first, listing as fallback
    #[default]
    Auto,
    Metadata,
    Listing,
}

impl std::str::FromStr for StrategyChoice {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(StrategyChoice::Auto),
            "metadata" => Ok(StrategyChoice::Metadata),
            "listing" => Ok(StrategyChoice::Listing),
            other => Err(MirrorError::Config(format!(
                "Unknown strategy '{}', expected auto, metadata or listing",
                other
            ))),
        }
    }
}

/// Ordered set of strategies
pub struct TreeResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl TreeResolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_choice(choice: StrategyChoice) -> Self {
        let strategies: Vec<Box<dyn ResolveStrategy>> = match choice {
            StrategyChoice::Auto => vec![
                Box::new(MetadataResolver::default()),
                Box::new(ListingResolver::default()),
            ],
            StrategyChoice::Metadata => vec![Box::new(MetadataResolver::default())],
            StrategyChoice::Listing => vec![Box::new(ListingResolver::default())],
        };
        Self::new(strategies)
    }

    /// Resolve the remote root into a deduplicated file set
    pub async fn resolve(&self, fetcher: &HttpFetcher, root: &Url) -> Result<FileSet> {
        for strategy in &self.strategies {
            let mut ctx = ResolveContext::new(fetcher, root);
            match strategy.resolve_folder(&mut ctx, root).await? {
                Visit::Applied => {
                    let files = ctx.into_files();
                    info!(
                        "Resolved {} files from {} using {} strategy",
                        files.len(),
                        root,
                        strategy.name()
                    );
                    return Ok(files);
                }
                Visit::NotApplicable => {
                    debug!("Strategy {} does not apply to {}", strategy.name(), root);
                }
            }
        }

        warn!("No strategy recognized {}, nothing to mirror", root);
        Ok(FileSet::new())
    }
}

impl Default for TreeResolver {
    fn default() -> Self {
        Self::from_choice(StrategyChoice::Auto)
    }
}
