//! Core types shared between the scan pipeline and the query path.

use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

/// Document identifier within the search index.
pub type DocId = u32;

/// Number of consecutive records grouped into one block.
pub const BLOCK_SIZE: usize = 50;

/// A single JSON primitive as stored in the search index.
///
/// Records are heterogeneous JSON objects; each field value is captured as
/// one of these variants at scan time. Nested arrays and objects are kept
/// as their raw JSON text.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Convert a parsed JSON value into its indexed representation.
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Null => FieldValue::Null,
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Numeric view of the value, if it has one. Integers widen to f64,
    /// matching how the index stores all numerics.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text rendering used when a value lands in a text-typed field.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// A record emitted by the splitter, ready for the search index.
///
/// The full record body is never carried here; only the primitive field
/// values needed for querying plus the ref key joining the record to its
/// containing block.
#[derive(Debug, Clone)]
pub struct IndexDoc {
    /// Ref key of the block this record belongs to.
    pub ref_key: String,
    /// Field name/value pairs extracted from the record.
    pub fields: Vec<(String, FieldValue)>,
}

impl IndexDoc {
    /// Build an index document from a parsed JSON object.
    pub fn from_object(ref_key: &str, object: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            ref_key: ref_key.to_string(),
            fields: object
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
        }
    }
}

/// Locator for one block of records inside a backing-store object.
///
/// `[start, end)` is a byte range; the ranges of all blocks of one object
/// are contiguous and cover the object exactly.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Unique join key between search documents and this block.
    pub ref_key: String,
    /// First byte of the block within the object.
    pub start: u64,
    /// One past the last byte of the block.
    pub end: u64,
    /// Object address within the backing store (path or object key).
    pub address: String,
    /// Adapter tag, informational only.
    pub store_kind: String,
}

impl BlockDescriptor {
    /// Byte length of the block.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One result returned by the search index, carrying the stored fields
/// needed to locate and re-identify the record.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Document uid assigned at write time.
    pub uid: String,
    /// Ref key of the containing block. Empty if the stored document was
    /// written without one.
    pub ref_key: String,
    /// Relevance score, higher is better.
    pub score: f32,
    /// Stored field values.
    pub fields: HashMap<String, FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_from_json() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"name":"morty","id":42,"ratio":0.5,"crisis":true,"gone":null}"#,
        )
        .unwrap();
        let obj = v.as_object().unwrap();

        assert_eq!(
            FieldValue::from_json(&obj["name"]),
            FieldValue::Text("morty".to_string())
        );
        assert_eq!(FieldValue::from_json(&obj["id"]), FieldValue::Int(42));
        assert_eq!(FieldValue::from_json(&obj["ratio"]), FieldValue::Float(0.5));
        assert_eq!(FieldValue::from_json(&obj["crisis"]), FieldValue::Bool(true));
        assert_eq!(FieldValue::from_json(&obj["gone"]), FieldValue::Null);
    }

    #[test]
    fn test_field_value_nested_kept_as_text() {
        let v: serde_json::Value = serde_json::from_str(r#"{"tags":["a","b"]}"#).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(
            FieldValue::from_json(&obj["tags"]),
            FieldValue::Text("[\"a\",\"b\"]".to_string())
        );
    }

    #[test]
    fn test_field_value_as_f64() {
        assert_eq!(FieldValue::Int(7).as_f64(), Some(7.0));
        assert_eq!(FieldValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
        assert_eq!(FieldValue::Text("7".to_string()).as_f64(), None);
    }

    #[test]
    fn test_block_descriptor_len() {
        let block = BlockDescriptor {
            ref_key: "a-0-50".to_string(),
            start: 100,
            end: 260,
            address: "a.jsonfiles".to_string(),
            store_kind: "LocalFS".to_string(),
        };
        assert_eq!(block.len(), 160);
        assert!(!block.is_empty());
    }
}
