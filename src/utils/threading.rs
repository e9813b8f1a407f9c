//! # Parallel Batch Executor
//!
//! ## Role
//! Fork-join partition of an index range across worker threads. Every stage of
//! every bootstrap round (ranking, correlation + test, aggregation) runs through
//! the same executor.
//!
//! ## Contract
//! - One rayon pool (threads named `diffcorr-worker-{i}`) lives for a whole
//!   pipeline invocation and is reused by every round.
//! - `partition(n)` yields `min(workers, n)` contiguous disjoint ranges. Each has
//!   `n / k` items, the last absorbs the remainder.
//! - Output buffers are carved into matching disjoint `&mut` slices before any
//!   task starts, so workers never share a write target and no locking is needed.
//! - `scope` / `for_each_batch` return only after every batch has finished.

use std::ops::Range;

use rayon::ThreadPool;
use tracing::warn;

use crate::error::{DiffCorrError, Result};

/// Reusable worker pool with a fork-join barrier per stage.
pub struct BatchExecutor {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("workers", &self.workers)
            .finish()
    }
}

impl BatchExecutor {
    /// Build a pool with `workers` threads. Zero workers is a configuration error.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(DiffCorrError::config(
                "worker count must be at least 1",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("diffcorr-worker-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    /// Workers actually used for `n_items` items
    pub fn effective_workers(&self, n_items: usize) -> usize {
        self.workers.min(n_items)
    }

    /// Log once when the requested worker count exceeds the item count.
    pub fn note_clamp(&self, n_items: usize) {
        if n_items > 0 && self.workers > n_items {
            warn!(
                workers = self.workers,
                items = n_items,
                "worker count exceeds item count, clamping to {}",
                n_items
            );
        }
    }

    /// Contiguous, disjoint batches covering `0..n_items`
    pub fn partition(&self, n_items: usize) -> Vec<Range<usize>> {
        partition(n_items, self.workers)
    }

    /// Run one task per batch inside the pool and wait for all of them.
    pub fn scope<B, F>(&self, batches: Vec<B>, task: F)
    where
        B: Send,
        F: Fn(B) + Sync,
    {
        let task = &task;
        self.pool.scope(|s| {
            for batch in batches {
                s.spawn(move |_| task(batch));
            }
        });
    }

    /// Partition `out` (rows of `width` values) and run `task(item_range, rows)`
    /// on each batch.
    pub fn for_each_batch<T, F>(&self, out: &mut [T], width: usize, task: F)
    where
        T: Send,
        F: Fn(Range<usize>, &mut [T]) + Sync,
    {
        let n_items = if width == 0 { 0 } else { out.len() / width };
        let ranges = self.partition(n_items);
        let chunks = split_rows(out, &ranges, width);
        let batches: Vec<_> = ranges.into_iter().zip(chunks).collect();
        self.scope(batches, |(range, chunk)| task(range, chunk));
    }
}

/// `min(workers, n_items)` ranges of `n_items / k`, the last one taking the remainder.
pub fn partition(n_items: usize, workers: usize) -> Vec<Range<usize>> {
    let k = workers.min(n_items);
    if k == 0 {
        return Vec::new();
    }
    let step = n_items / k;
    (0..k)
        .map(|b| {
            let start = b * step;
            let end = if b + 1 == k { n_items } else { start + step };
            start..end
        })
        .collect()
}

/// Carve `buf` into one mutable slice per range (width 1).
pub fn split_by_ranges<'a, T>(buf: &'a mut [T], ranges: &[Range<usize>]) -> Vec<&'a mut [T]> {
    split_rows(buf, ranges, 1)
}

/// Carve a row-major buffer of `width`-wide rows into one mutable slice per
/// range of rows. Ranges must be sorted and contiguous from 0.
pub fn split_rows<'a, T>(
    mut buf: &'a mut [T],
    ranges: &[Range<usize>],
    width: usize,
) -> Vec<&'a mut [T]> {
    let mut out = Vec::with_capacity(ranges.len());
    let mut consumed = 0;
    for range in ranges {
        debug_assert_eq!(range.start, consumed);
        let (head, tail) = std::mem::take(&mut buf).split_at_mut(range.len() * width);
        out.push(head);
        buf = tail;
        consumed = range.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_workers_rejected() {
        let err = BatchExecutor::new(0).unwrap_err();
        assert!(matches!(err, DiffCorrError::Config { .. }));
    }

    #[test]
    fn test_partition_even_and_remainder() {
        assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition(9, 3), vec![0..3, 3..6, 6..9]);
        assert_eq!(partition(5, 1), vec![0..5]);
    }

    #[test]
    fn test_partition_clamps_to_items() {
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn test_split_rows() {
        let mut buf: Vec<u32> = (0..12).collect();
        let chunks = split_rows(&mut buf, &[0..1, 1..3], 4);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], &[0, 1, 2, 3]);
        assert_eq!(chunks[1].len(), 8);
    }

    #[test]
    fn test_for_each_batch_writes_every_slot() {
        let executor = BatchExecutor::new(3).unwrap();
        let mut out = vec![0usize; 100];
        executor.for_each_batch(&mut out, 1, |range, chunk| {
            for (slot, i) in chunk.iter_mut().zip(range) {
                *slot = i * 2;
            }
        });
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
    }

    #[test]
    fn test_more_workers_than_items() {
        let executor = BatchExecutor::new(16).unwrap();
        assert_eq!(executor.effective_workers(3), 3);
        let mut out = vec![0u8; 3];
        executor.for_each_batch(&mut out, 1, |_, chunk| chunk.fill(1));
        assert_eq!(out, vec![1, 1, 1]);
    }
}
