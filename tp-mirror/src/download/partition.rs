//! Splitting a file list into worker jobs.

use std::ops::Range;

/// Split `len` items into `min(workers, len)` contiguous ranges whose sizes
/// differ by at most one. Earlier ranges take the remainder.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let chunks = workers.max(1).min(len);
    if chunks == 0 {
        return Vec::new();
    }

    let base = len / chunks;
    let remainder = len % chunks;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;

    for i in 0..chunks {
        let size = base + usize::from(i < remainder);
        ranges.push(start..start + size);
        start += size;
    }

    ranges
}
