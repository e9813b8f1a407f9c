//! # Triangular Pair Indexing
//!
//! ## Role
//! Bijection between unordered entity pairs `{i, j}` (i != j) over `base`
//! entities and the linear range `0..base*(base-1)/2`. Pairs are enumerated
//! with `i < j`, lexicographically by `i` then `j`:
//!
//! ```text
//! base = 4
//! (0,1)=0 (0,2)=1 (0,3)=2 (1,2)=3 (1,3)=4 (2,3)=5
//! ```
//!
//! Exhaustive pipelines never materialize the symmetric matrix; they walk
//! the linear range and decode each position on demand, and per-entity
//! aggregation uses [`neighbors`] to find an entity's row of pair positions.

use crate::data::ids::EntityIdx;

/// Number of unordered pairs over `base` entities
#[inline]
pub fn n_pairs(base: usize) -> usize {
    base * base.saturating_sub(1) / 2
}

/// Linear position of the first pair whose smaller member is `i`
#[inline]
fn row_start(i: usize, base: usize) -> usize {
    (2 * base - i - 1) * i / 2
}

/// Linear position of the pair `{first, second}`.
///
/// Argument order does not matter. Returns `None` for the diagonal
/// (`first == second`), which has no position.
#[inline]
pub fn encode(first: usize, second: usize, base: usize) -> Option<usize> {
    if first == second {
        return None;
    }
    let (i, j) = if first < second {
        (first, second)
    } else {
        (second, first)
    };
    debug_assert!(j < base, "pair ({}, {}) outside base {}", i, j, base);
    Some(row_start(i, base) + (j - i - 1))
}

/// Inverse of [`encode`]: the pair `(i, j)` with `i < j` at linear position `index`.
///
/// `i` comes from inverting the triangular row offset
/// `(2b - i - 1) i / 2 <= index` with the quadratic formula; `j` then follows
/// from `index` modulo `base` plus the triangular correction `(i+1)(i+2)/2`.
#[inline]
pub fn decode(index: usize, base: usize) -> (usize, usize) {
    debug_assert!(index < n_pairs(base), "index {} outside base {}", index, base);

    let b = (2 * base - 1) as f64;
    let disc = (b * b - 8.0 * index as f64).max(0.0);
    let mut i = ((b - disc.sqrt()) / 2.0).floor() as usize;

    // The float root can land one row off for very large bases.
    while i > 0 && row_start(i, base) > index {
        i -= 1;
    }
    while i + 2 < base && row_start(i + 1, base) <= index {
        i += 1;
    }

    let j = (index % base + ((i + 2) * (i + 1) / 2) % base) % base;
    (i, j)
}

/// Positions of every pair containing `entity`, one per partner `j` in `0..base`.
///
/// The self entry (`j == entity`) is `None`.
pub fn neighbors(entity: usize, base: usize) -> Vec<Option<usize>> {
    neighbor_iter(entity, base).collect()
}

/// Lazy form of [`neighbors`]
#[inline]
pub fn neighbor_iter(entity: usize, base: usize) -> impl Iterator<Item = Option<usize>> {
    (0..base).map(move |j| encode(entity, j, base))
}

/// Row-major `entities.len() x base` matrix of [`neighbors`] rows.
pub fn neighbor_matrix(entities: &[EntityIdx], base: usize) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(entities.len() * base);
    for entity in entities {
        out.extend((0..base).map(|j| encode(entity.as_usize(), j, base)));
    }
    out
}

/// Expand a triangular pair vector into dense rows for the requested entities.
///
/// Row `r` holds `values[encode(entities[r], j)]` for every `j`, with 1.0 on
/// the diagonal. Output is row-major `entities.len() x base`.
pub fn quadrate(values: &[f32], entities: &[EntityIdx], base: usize) -> Vec<f32> {
    debug_assert_eq!(values.len(), n_pairs(base));
    let mut out = Vec::with_capacity(entities.len() * base);
    for entity in entities {
        out.extend((0..base).map(|j| match encode(entity.as_usize(), j, base) {
            Some(k) => values[k],
            None => 1.0,
        }));
    }
    out
}
