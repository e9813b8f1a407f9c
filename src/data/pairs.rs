//! # Pair Sets
//!
//! The set of entity pairs a pipeline evaluates: either explicit parallel
//! (source, target) arrays, or the implicit exhaustive enumeration of all
//! unordered pairs over the matrix rows (see [`crate::model::pair_index`]).

use crate::data::ids::EntityIdx;
use crate::error::{DiffCorrError, Result};
use crate::model::pair_index;

/// Pairs to evaluate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairSet {
    /// Explicit pairs; position `k` is `(sources[k], targets[k])`
    Explicit {
        sources: Vec<EntityIdx>,
        targets: Vec<EntityIdx>,
    },
    /// All `base*(base-1)/2` unordered pairs in triangular order
    Exhaustive { base: usize },
}

impl PairSet {
    /// Explicit pairs from parallel arrays; lengths must match.
    pub fn explicit(sources: Vec<EntityIdx>, targets: Vec<EntityIdx>) -> Result<Self> {
        if sources.len() != targets.len() {
            return Err(DiffCorrError::config(format!(
                "source and target index arrays differ in length ({} vs {})",
                sources.len(),
                targets.len()
            )));
        }
        Ok(PairSet::Explicit { sources, targets })
    }

    /// Every unordered pair over `base` entities
    pub fn exhaustive(base: usize) -> Self {
        PairSet::Exhaustive { base }
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        match self {
            PairSet::Explicit { sources, .. } => sources.len(),
            PairSet::Exhaustive { base } => pair_index::n_pairs(*base),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row indices of the pair at position `k`
    #[inline]
    pub fn pair(&self, k: usize) -> (usize, usize) {
        match self {
            PairSet::Explicit { sources, targets } => {
                (sources[k].as_usize(), targets[k].as_usize())
            }
            PairSet::Exhaustive { base } => pair_index::decode(k, *base),
        }
    }

    /// Source array for explicit pairs
    pub fn sources(&self) -> Option<&[EntityIdx]> {
        match self {
            PairSet::Explicit { sources, .. } => Some(sources),
            PairSet::Exhaustive { .. } => None,
        }
    }

    /// Check every referenced entity exists in a matrix with `n_entities` rows.
    pub fn validate(&self, n_entities: usize) -> Result<()> {
        match self {
            PairSet::Explicit { sources, targets } => {
                let out_of_range = sources
                    .iter()
                    .chain(targets.iter())
                    .find(|e| e.as_usize() >= n_entities);
                if let Some(e) = out_of_range {
                    return Err(DiffCorrError::config(format!(
                        "entity index {} out of range for {} entities",
                        e.0, n_entities
                    )));
                }
            }
            PairSet::Exhaustive { base } => {
                if *base != n_entities {
                    return Err(DiffCorrError::config(format!(
                        "exhaustive pair base {} does not match {} entities",
                        base, n_entities
                    )));
                }
            }
        }
        Ok(())
    }

    /// Stable reorder of explicit pairs by source, so every source's partners
    /// form one contiguous run. A per-pair `values` array, if given, is
    /// permuted alongside. Exhaustive sets are already grouped and are left as is.
    pub fn sort_by_source(&mut self, values: Option<&mut [f32]>) -> Result<()> {
        let PairSet::Explicit { sources, targets } = self else {
            return Ok(());
        };

        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by_key(|&k| sources[k]);

        *sources = order.iter().map(|&k| sources[k]).collect();
        *targets = order.iter().map(|&k| targets[k]).collect();

        if let Some(values) = values {
            if values.len() != order.len() {
                return Err(DiffCorrError::config(format!(
                    "value array has {} entries, expected {}",
                    values.len(),
                    order.len()
                )));
            }
            let permuted: Vec<f32> = order.iter().map(|&k| values[k]).collect();
            values.copy_from_slice(&permuted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u32]) -> Vec<EntityIdx> {
        v.iter().copied().map(EntityIdx::new).collect()
    }

    #[test]
    fn test_explicit_length_mismatch() {
        let err = PairSet::explicit(ids(&[0, 1]), ids(&[1])).unwrap_err();
        assert!(matches!(err, DiffCorrError::Config { .. }));
    }

    #[test]
    fn test_exhaustive_pairs() {
        let pairs = PairSet::exhaustive(4);
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs.pair(0), (0, 1));
        assert_eq!(pairs.pair(5), (2, 3));
        assert!(pairs.validate(4).is_ok());
        assert!(pairs.validate(5).is_err());
    }

    #[test]
    fn test_validate_out_of_range() {
        let pairs = PairSet::explicit(ids(&[0, 3]), ids(&[1, 2])).unwrap();
        assert!(pairs.validate(4).is_ok());
        assert!(pairs.validate(3).is_err());
    }

    #[test]
    fn test_sort_by_source_carries_values() {
        let mut pairs = PairSet::explicit(ids(&[2, 0, 2, 1]), ids(&[0, 1, 3, 3])).unwrap();
        let mut values = [0.2, 0.0, 0.23, 0.1];
        pairs.sort_by_source(Some(&mut values)).unwrap();

        assert_eq!(pairs.sources().unwrap(), ids(&[0, 1, 2, 2]).as_slice());
        assert_eq!(pairs.pair(2), (2, 0));
        assert_eq!(pairs.pair(3), (2, 3));
        assert_eq!(values, [0.0, 0.1, 0.2, 0.23]);
    }
}
