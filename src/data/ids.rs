//! # Entity and Sample Identifiers
//!
//! Index newtypes for matrix rows (entities) and columns (samples), plus a
//! name table used by the table readers to resolve ids from input files.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Zero-cost newtype for entity (matrix row) indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityIdx(pub u32);

impl EntityIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for EntityIdx {
    fn from(idx: u32) -> Self {
        Self(idx)
    }
}

impl From<usize> for EntityIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<EntityIdx> for usize {
    fn from(idx: EntityIdx) -> usize {
        idx.0 as usize
    }
}

/// Zero-cost newtype for sample (matrix column) indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleIdx(pub u32);

impl SampleIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for SampleIdx {
    fn from(idx: u32) -> Self {
        Self(idx)
    }
}

impl From<usize> for SampleIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<SampleIdx> for usize {
    fn from(idx: SampleIdx) -> usize {
        idx.0 as usize
    }
}

/// An ordered table of names with reverse lookup.
///
/// Used for both entity ids (row labels) and sample ids (column labels).
#[derive(Clone, Debug, Default)]
pub struct Labels {
    names: Vec<Arc<str>>,
    name_to_idx: HashMap<Arc<str>, u32>,
}

impl Labels {
    /// Create from a vector of names. Later duplicates shadow earlier ones in lookups.
    pub fn from_names(names: Vec<String>) -> Self {
        let names: Vec<Arc<str>> = names.into_iter().map(|s| s.into()).collect();
        let name_to_idx = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();

        Self { names, name_to_idx }
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a label
    pub fn position(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).map(|&i| i as usize)
    }

    /// Entity index by name
    pub fn entity(&self, name: &str) -> Option<EntityIdx> {
        self.position(name).map(EntityIdx::from)
    }

    /// Sample index by name
    pub fn sample(&self, name: &str) -> Option<SampleIdx> {
        self.position(name).map(SampleIdx::from)
    }

    /// Name at a position
    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_conversions() {
        let entity = EntityIdx::from(7usize);
        assert_eq!(entity.as_usize(), 7);
        assert_eq!(usize::from(SampleIdx::new(3)), 3);
    }

    #[test]
    fn test_labels_lookup() {
        let labels = Labels::from_names(vec!["TP53".to_string(), "MDM2".to_string()]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.entity("TP53"), Some(EntityIdx::new(0)));
        assert_eq!(labels.sample("MDM2"), Some(SampleIdx::new(1)));
        assert_eq!(labels.position("BRCA1"), None);
        assert_eq!(labels.name(1), "MDM2");
    }

    #[test]
    fn test_indices_serialize_in_outputs() {
        fn serde_bound<T: Serialize + for<'de> Deserialize<'de>>() {}
        serde_bound::<EntityIdx>();
        serde_bound::<SampleIdx>();
        serde_bound::<Vec<EntityIdx>>();
        assert_eq!(EntityIdx::default(), EntityIdx::new(0));
        assert!(SampleIdx::new(1) < SampleIdx::new(2));
    }
}
