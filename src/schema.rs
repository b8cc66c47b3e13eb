//! Schema sampling: infer per-field storage types from the first records.
//!
//! The set of record fields is unknown until scan time, so the pipeline
//! samples an initial batch of records and classifies each field into one
//! of three storage kinds. The resulting mapping is fixed for the lifetime
//! of the index and drives both the postings layout and query planning.

use crate::types::{FieldValue, IndexDoc};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

/// How many records the sampler inspects before the mapping is frozen.
pub const SAMPLE_SIZE: usize = 50;

/// Storage kind of a record field in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Numeric,
    Boolean,
}

impl FieldKind {
    /// Classify one value. Nulls carry no type information.
    pub fn of(value: &FieldValue) -> Option<FieldKind> {
        match value {
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Int(_) | FieldValue::Float(_) => Some(FieldKind::Numeric),
            FieldValue::Bool(_) => Some(FieldKind::Boolean),
            FieldValue::Null => None,
        }
    }
}

/// Field name to storage kind mapping, frozen after sampling.
///
/// Fields never seen during sampling are treated as text.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    kinds: HashMap<String, FieldKind>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the fields of a batch of sampled records.
    pub fn from_sample(docs: &[IndexDoc]) -> Self {
        let mut mapping = Self::new();
        for doc in docs {
            for (field, value) in &doc.fields {
                mapping.observe(field, value);
            }
        }
        mapping
    }

    /// Register one observed value. The first classification of a field
    /// wins; later conflicting values do not retype it.
    pub fn observe(&mut self, field: &str, value: &FieldValue) {
        if self.kinds.contains_key(field) {
            return;
        }
        if let Some(kind) = FieldKind::of(value) {
            self.kinds.insert(field.to_string(), kind);
        }
    }

    /// Storage kind for a field, defaulting to text for unsampled fields.
    pub fn kind(&self, field: &str) -> FieldKind {
        self.kinds.get(field).copied().unwrap_or(FieldKind::Text)
    }

    /// Number of fields with an explicit classification.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Flatten to pairs for archiving.
    pub fn to_pairs(&self) -> Vec<(String, FieldKind)> {
        let mut pairs: Vec<_> = self
            .kinds
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// Rebuild from archived pairs.
    pub fn from_pairs(pairs: Vec<(String, FieldKind)>) -> Self {
        Self {
            kinds: pairs.into_iter().collect(),
        }
    }
}
