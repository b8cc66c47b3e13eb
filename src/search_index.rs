//! Full-text index over record fields: tokenizer, BM25 scoring, typed
//! per-field postings, and rkyv-archived persistence.
//!
//! Each document is stored under a writer-assigned uid together with the
//! ref key of its containing block. Text fields feed an inverted index
//! scored with BM25; numeric and boolean fields keep flat value lists
//! served by range and equality queries.

use crate::error::IndexError;
use crate::schema::{FieldKind, FieldMapping};
use crate::types::{DocId, FieldValue, Hit, IndexDoc};
use rkyv::rancor::Error as RkyvError;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// BM25 parameter k1 (term frequency saturation).
const BM25_K1: f32 = 1.2;

/// BM25 parameter b (length normalization).
const BM25_B: f32 = 0.75;

/// File holding the archived index inside the search directory.
const INDEX_FILE: &str = "index.bin";

/// Tokenize text into terms.
///
/// Applies: lowercase, split on non-alphanumeric, drop empty tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Calculate BM25 score for a term in a document.
///
/// # Arguments
/// * `tf` - Term frequency in the document
/// * `doc_len` - Number of terms in the document
/// * `avg_doc_len` - Average document length across corpus
/// * `doc_count` - Total number of documents
/// * `doc_freq` - Number of documents containing the term
pub fn bm25_score(tf: f32, doc_len: u32, avg_doc_len: f32, doc_count: u32, doc_freq: u32) -> f32 {
    if doc_freq == 0 || doc_count == 0 {
        return 0.0;
    }

    let n = doc_freq as f32;
    let big_n = doc_count as f32;
    let idf = ((big_n - n + 0.5) / (n + 0.5) + 1.0).ln();

    let dl = doc_len as f32;
    let tf_component =
        (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avg_doc_len.max(1.0)));

    idf * tf_component
}

/// A posting entry: document ID and term frequency.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: f32,
}

/// Posting list for one term within one field, ordered by doc_id.
#[derive(Debug, Clone, Default, Archive, Serialize, Deserialize)]
pub struct PostingList {
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn add(&mut self, doc_id: DocId, tf: f32) {
        self.postings.push(Posting { doc_id, tf });
    }

    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }
}

/// A document as stored in the index.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct StoredDoc {
    pub uid: String,
    pub ref_key: String,
    /// Set when a later put reused this document's uid.
    pub replaced: bool,
    pub fields: Vec<(String, FieldValue)>,
}

/// Typed queries executed by the search index.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Free-text match over every text field of the document.
    Phrase(String),
    /// All terms of `value` must appear in `field`.
    FieldText { field: String, value: String },
    /// Inclusive numeric range over `field`.
    NumericRange { field: String, min: f64, max: f64 },
    /// Boolean equality over `field`.
    Boolean { field: String, value: bool },
    /// Fetch one document by uid.
    ById(String),
}

/// Archived on-disk form of the index. Maps flatten to sorted pairs and
/// are rebuilt on open.
#[derive(Debug, Archive, Serialize, Deserialize)]
struct SearchIndexArchive {
    mapping: Vec<(String, FieldKind)>,
    docs: Vec<StoredDoc>,
    text_postings: Vec<(String, Vec<(String, PostingList)>)>,
    numeric_values: Vec<(String, Vec<(f64, DocId)>)>,
    bool_values: Vec<(String, Vec<(bool, DocId)>)>,
    doc_lengths: Vec<u32>,
}

/// Inverted index over record fields.
pub struct SearchIndex {
    mapping: FieldMapping,
    docs: Vec<StoredDoc>,
    uid_map: HashMap<String, DocId>,
    /// field -> term -> postings.
    text_postings: HashMap<String, HashMap<String, PostingList>>,
    /// field -> (value, doc) pairs in insertion order.
    numeric_values: HashMap<String, Vec<(f64, DocId)>>,
    bool_values: HashMap<String, Vec<(bool, DocId)>>,
    /// Token count per document across its text fields.
    doc_lengths: Vec<u32>,
}

impl SearchIndex {
    /// Create an empty index with a frozen field mapping.
    pub fn new(mapping: FieldMapping) -> Self {
        Self {
            mapping,
            docs: Vec::new(),
            uid_map: HashMap::new(),
            text_postings: HashMap::new(),
            numeric_values: HashMap::new(),
            bool_values: HashMap::new(),
            doc_lengths: Vec::new(),
        }
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.docs.iter().filter(|d| !d.replaced).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored documents, including replaced ones.
    pub fn documents(&self) -> &[StoredDoc] {
        &self.docs
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Insert a document under `uid`, replacing any previous document
    /// written under the same uid.
    pub fn put(&mut self, uid: &str, doc: &IndexDoc) {
        if let Some(&old) = self.uid_map.get(uid) {
            self.docs[old as usize].replaced = true;
        }

        let doc_id = self.docs.len() as DocId;
        let mut doc_len: u32 = 0;

        for (field, value) in &doc.fields {
            match self.mapping.kind(field) {
                FieldKind::Text => {
                    let mut tf: HashMap<String, f32> = HashMap::new();
                    for token in tokenize(&value.render()) {
                        *tf.entry(token).or_insert(0.0) += 1.0;
                        doc_len += 1;
                    }
                    let terms = self.text_postings.entry(field.clone()).or_default();
                    for (token, count) in tf {
                        terms.entry(token).or_default().add(doc_id, count);
                    }
                }
                FieldKind::Numeric => {
                    if let Some(v) = value.as_f64() {
                        self.numeric_values
                            .entry(field.clone())
                            .or_default()
                            .push((v, doc_id));
                    }
                }
                FieldKind::Boolean => {
                    if let FieldValue::Bool(b) = value {
                        self.bool_values
                            .entry(field.clone())
                            .or_default()
                            .push((*b, doc_id));
                    }
                }
            }
        }

        self.doc_lengths.push(doc_len);
        self.docs.push(StoredDoc {
            uid: uid.to_string(),
            ref_key: doc.ref_key.clone(),
            replaced: false,
            fields: doc.fields.clone(),
        });
        self.uid_map.insert(uid.to_string(), doc_id);
    }

    /// Execute a query. Hits are ordered by descending score with doc
    /// order as the tie break; zero hits is an error.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Hit>, IndexError> {
        let mut scored = match query {
            SearchQuery::Phrase(text) => self.match_terms(text, None),
            SearchQuery::FieldText { field, value } => self.match_terms(value, Some(field)),
            SearchQuery::NumericRange { field, min, max } => self.match_numeric(field, *min, *max),
            SearchQuery::Boolean { field, value } => self.match_bool(field, *value),
            SearchQuery::ById(uid) => self
                .uid_map
                .get(uid)
                .map(|&id| (id, 1.0f32))
                .into_iter()
                .collect(),
        };

        scored.retain(|(id, _)| !self.docs[*id as usize].replaced);
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        if scored.is_empty() {
            return Err(IndexError::Empty);
        }

        Ok(scored
            .into_iter()
            .map(|(id, score)| {
                let doc = &self.docs[id as usize];
                Hit {
                    uid: doc.uid.clone(),
                    ref_key: doc.ref_key.clone(),
                    score,
                    fields: doc.fields.iter().cloned().collect(),
                }
            })
            .collect())
    }

    /// Score documents containing every token of `text`, across all text
    /// fields or restricted to one.
    fn match_terms(&self, text: &str, only_field: Option<&str>) -> Vec<(DocId, f32)> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let avg_doc_len = if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.doc_lengths.iter().sum::<u32>() as f32 / self.doc_lengths.len() as f32
        };
        let doc_count = self.docs.len() as u32;

        let mut matched: Option<HashMap<DocId, f32>> = None;
        for token in &tokens {
            let mut token_scores: HashMap<DocId, f32> = HashMap::new();
            for (field, terms) in &self.text_postings {
                if only_field.is_some_and(|f| f != field) {
                    continue;
                }
                if let Some(list) = terms.get(token) {
                    for posting in &list.postings {
                        let doc_len = self
                            .doc_lengths
                            .get(posting.doc_id as usize)
                            .copied()
                            .unwrap_or(0);
                        let score = bm25_score(
                            posting.tf,
                            doc_len,
                            avg_doc_len,
                            doc_count,
                            list.doc_freq(),
                        );
                        *token_scores.entry(posting.doc_id).or_insert(0.0) += score;
                    }
                }
            }

            // Every token must match somewhere in the document.
            matched = Some(match matched {
                None => token_scores,
                Some(mut acc) => {
                    acc.retain(|id, _| token_scores.contains_key(id));
                    for (id, score) in token_scores {
                        if let Some(total) = acc.get_mut(&id) {
                            *total += score;
                        }
                    }
                    acc
                }
            });
        }

        matched.map(|m| m.into_iter().collect()).unwrap_or_default()
    }

    fn match_numeric(&self, field: &str, min: f64, max: f64) -> Vec<(DocId, f32)> {
        self.numeric_values
            .get(field)
            .map(|values| {
                values
                    .iter()
                    .filter(|(v, _)| *v >= min && *v <= max)
                    .map(|(_, id)| (*id, 1.0))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn match_bool(&self, field: &str, value: bool) -> Vec<(DocId, f32)> {
        self.bool_values
            .get(field)
            .map(|values| {
                values
                    .iter()
                    .filter(|(v, _)| *v == value)
                    .map(|(_, id)| (*id, 1.0))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Write the index into `dir` as a single archive file.
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(internal)?;

        let mut text_postings: Vec<(String, Vec<(String, PostingList)>)> = self
            .text_postings
            .iter()
            .map(|(field, terms)| {
                let mut entries: Vec<_> =
                    terms.iter().map(|(t, pl)| (t.clone(), pl.clone())).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                (field.clone(), entries)
            })
            .collect();
        text_postings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut numeric_values: Vec<(String, Vec<(f64, DocId)>)> = self
            .numeric_values
            .iter()
            .map(|(field, values)| (field.clone(), values.clone()))
            .collect();
        numeric_values.sort_by(|a, b| a.0.cmp(&b.0));

        let mut bool_values: Vec<(String, Vec<(bool, DocId)>)> = self
            .bool_values
            .iter()
            .map(|(field, values)| (field.clone(), values.clone()))
            .collect();
        bool_values.sort_by(|a, b| a.0.cmp(&b.0));

        let archive = SearchIndexArchive {
            mapping: self.mapping.to_pairs(),
            docs: self.docs.clone(),
            text_postings,
            numeric_values,
            bool_values,
            doc_lengths: self.doc_lengths.clone(),
        };

        let bytes = rkyv::to_bytes::<RkyvError>(&archive).map_err(internal)?;
        std::fs::write(dir.join(INDEX_FILE), &bytes).map_err(internal)?;
        Ok(())
    }

    /// Load an index previously written by `persist`.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(dir.join(INDEX_FILE)).map_err(internal)?;
        let archive = rkyv::from_bytes::<SearchIndexArchive, RkyvError>(&bytes).map_err(internal)?;

        let uid_map = archive
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.replaced)
            .map(|(i, d)| (d.uid.clone(), i as DocId))
            .collect();

        Ok(Self {
            mapping: FieldMapping::from_pairs(archive.mapping),
            uid_map,
            text_postings: archive
                .text_postings
                .into_iter()
                .map(|(field, entries)| (field, entries.into_iter().collect()))
                .collect(),
            numeric_values: archive.numeric_values.into_iter().collect(),
            bool_values: archive.bool_values.into_iter().collect(),
            docs: archive.docs,
            doc_lengths: archive.doc_lengths,
        })
    }
}

fn internal(e: impl std::fmt::Display) -> IndexError {
    IndexError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_index() -> SearchIndex {
        let docs = [
            ("mainIndex-1", 1i64, "Rick Sanchez", true),
            ("mainIndex-2", 2, "Morty Smith", false),
            ("mainIndex-3", 3, "Summer Smith", false),
        ];
        let index_docs: Vec<IndexDoc> = docs
            .iter()
            .map(|(_, id, name, crisis)| IndexDoc {
                ref_key: format!("a.jsonfiles-{id}-50"),
                fields: vec![
                    ("ID".to_string(), FieldValue::Int(*id)),
                    ("Name".to_string(), FieldValue::Text(name.to_string())),
                    ("Crisis".to_string(), FieldValue::Bool(*crisis)),
                ],
            })
            .collect();

        let mapping = FieldMapping::from_sample(&index_docs);
        let mut index = SearchIndex::new(mapping);
        for ((uid, _, _, _), doc) in docs.iter().zip(index_docs.iter()) {
            index.put(uid, doc);
        }
        index
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
        assert_eq!(tokenize("n_42"), vec!["n", "42"]);
        assert!(tokenize("  ,, ").is_empty());
    }

    #[test]
    fn test_numeric_range_query() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::NumericRange {
                field: "ID".to_string(),
                min: 2.0,
                max: 2.0,
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, "mainIndex-2");
        assert_eq!(
            hits[0].fields.get("Name"),
            Some(&FieldValue::Text("Morty Smith".to_string()))
        );
    }

    #[test]
    fn test_numeric_range_spans_documents() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::NumericRange {
                field: "ID".to_string(),
                min: 1.0,
                max: 2.0,
            })
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_boolean_query() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::Boolean {
                field: "Crisis".to_string(),
                value: true,
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, "mainIndex-1");
    }

    #[test]
    fn test_field_text_query() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::FieldText {
                field: "Name".to_string(),
                value: "Smith".to_string(),
            })
            .unwrap();
        assert_eq!(hits.len(), 2);

        // Both terms must appear in the field.
        let hits = index.search(&SearchQuery::FieldText {
            field: "Name".to_string(),
            value: "Morty Smith".to_string(),
        });
        assert_eq!(hits.unwrap().len(), 1);
    }

    #[test]
    fn test_phrase_query_ranks_rarer_terms_higher() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::Phrase("smith".to_string()))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = index
            .search(&SearchQuery::Phrase("morty".to_string()))
            .unwrap();
        assert_eq!(hits[0].uid, "mainIndex-2");
    }

    #[test]
    fn test_by_id_query() {
        let index = test_index();
        let hits = index
            .search(&SearchQuery::ById("mainIndex-3".to_string()))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ref_key, "a.jsonfiles-3-50");
    }

    #[test]
    fn test_zero_hits_is_empty_error() {
        let index = test_index();
        let result = index.search(&SearchQuery::Phrase("beth".to_string()));
        assert!(matches!(result, Err(IndexError::Empty)));

        let result = index.search(&SearchQuery::NumericRange {
            field: "ID".to_string(),
            min: 99.0,
            max: 99.0,
        });
        assert!(matches!(result, Err(IndexError::Empty)));
    }

    #[test]
    fn test_put_replaces_by_uid() {
        let mut index = test_index();
        let replacement = IndexDoc {
            ref_key: "a.jsonfiles-9-50".to_string(),
            fields: vec![
                ("ID".to_string(), FieldValue::Int(1)),
                ("Name".to_string(), FieldValue::Text("Rick Prime".to_string())),
            ],
        };
        index.put("mainIndex-1", &replacement);

        assert_eq!(index.len(), 3);
        let hits = index
            .search(&SearchQuery::ById("mainIndex-1".to_string()))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ref_key, "a.jsonfiles-9-50");
    }

    #[test]
    fn test_unsampled_field_indexes_as_text() {
        let mut index = SearchIndex::new(FieldMapping::new());
        index.put(
            "mainIndex-1",
            &IndexDoc {
                ref_key: "r-1-50".to_string(),
                fields: vec![("Job".to_string(), FieldValue::Text("scientist".to_string()))],
            },
        );
        let hits = index
            .search(&SearchQuery::FieldText {
                field: "Job".to_string(),
                value: "scientist".to_string(),
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_persist_and_open_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let index = test_index();
        index.persist(tmp.path()).unwrap();

        let reopened = SearchIndex::open(tmp.path()).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.mapping().kind("ID"), FieldKind::Numeric);

        let hits = reopened
            .search(&SearchQuery::NumericRange {
                field: "ID".to_string(),
                min: 3.0,
                max: 3.0,
            })
            .unwrap();
        assert_eq!(hits[0].uid, "mainIndex-3");

        let hits = reopened
            .search(&SearchQuery::Phrase("rick".to_string()))
            .unwrap();
        assert_eq!(hits[0].uid, "mainIndex-1");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let result = SearchIndex::open(&tmp.path().join("nope"));
        assert!(matches!(result, Err(IndexError::Internal(_))));
    }
}
