//! Directory traversal over a local mirror.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A regular file found under a mirror directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path relative to the walked root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// File count and total size of a tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Walk a directory tree and collect all regular files, sorted by relative path
///
/// # Example
/// ```no_run
/// use tp_mirror::fs::walker::walk_files;
/// use std::path::Path;
///
/// let files = walk_files(Path::new("/data")).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_files(root: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        files.push(FileInfo {
            relative_path,
            size: entry.metadata()?.len(),
        });
    }

    Ok(files)
}

/// Count files and bytes under a directory. A missing directory is empty.
pub fn summarize(root: &Path) -> std::io::Result<TreeSummary> {
    if !root.exists() {
        return Ok(TreeSummary::default());
    }

    let files = walk_files(root)?;
    Ok(TreeSummary {
        files: files.len(),
        bytes: files.iter().map(|f| f.size).sum(),
    })
}
