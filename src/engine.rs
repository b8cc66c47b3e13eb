//! Engine: opens or builds the two indexes at startup and orchestrates
//! retrieval for every query.
//!
//! Retrieval walks the same path for each hit: ref key out of the hit,
//! block descriptor out of the block index, range read from the backing
//! store, then a linear rescan of the fetched block for the record itself.

use crate::block_index::BlockIndex;
use crate::builder;
use crate::error::{Result, RetrieveError};
use crate::planner;
use crate::search_index::SearchIndex;
use crate::splitter::{match_record_by_field, match_record_containing};
use crate::storage::{self, BackingStore};
use crate::types::Hit;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local directory or object-store URL holding the record files.
    pub storage_path: String,
    /// Directory holding the two index directories.
    pub index_path: PathBuf,
    /// HTTP listen port.
    pub port: u16,
}

/// The two indexes plus the backing store they reference.
pub struct Engine {
    store: Arc<dyn BackingStore>,
    search: SearchIndex,
    blocks: BlockIndex,
}

impl Engine {
    /// Connect to storage and open the indexes, building them first if
    /// they do not exist yet. Returns only once both indexes are fully
    /// committed, so every search hit has its block descriptor.
    pub async fn start(config: &Config) -> Result<Engine> {
        let store = storage::connect(&config.storage_path)?;
        store.validate().await?;

        let search_dir = config.index_path.join("search");
        let data_dir = config.index_path.join("data");

        // Only the data directory is probed: the indexes are written
        // together, so either both exist or neither does.
        let (search, blocks) = if data_dir.exists() {
            info!(path = %config.index_path.display(), "found existing indexes");
            (SearchIndex::open(&search_dir)?, BlockIndex::open(&data_dir)?)
        } else {
            info!(path = %config.index_path.display(), "no indexes found, scanning storage");
            let out = builder::build_indexes(Arc::clone(&store)).await?;
            out.search.persist(&search_dir)?;
            out.blocks.persist(&data_dir)?;
            (out.search, out.blocks)
        };

        info!(
            documents = search.len(),
            blocks = blocks.len(),
            "engine started"
        );
        Ok(Engine {
            store,
            search,
            blocks,
        })
    }

    /// Free-text search: return the raw bytes of the best record whose
    /// JSON contains `text`.
    pub async fn search(&self, text: &str) -> Result<Vec<u8>> {
        let hits = self.search.search(&planner::plan_text_query(text))?;
        let chunk = self.block_bytes(&hits[0]).await?;
        let record = match_record_containing(&chunk, text)
            .ok_or_else(|| RetrieveError::NoMatch(format!("no record contains '{text}'")))?;
        validate_json(record)?;
        Ok(record.to_vec())
    }

    /// Return the raw bytes of the best record where `field` equals
    /// `value`.
    pub async fn get_one(&self, field: &str, value: &str) -> Result<Vec<u8>> {
        let hits = self.search.search(&planner::plan_field_query(field, value))?;
        self.fetch_match(&hits[0], field, value).await
    }

    /// Return a JSON array of every record where `field` equals `value`,
    /// in hit order. Hits that fail retrieval are skipped.
    pub async fn get_many(&self, field: &str, value: &str) -> Result<Vec<u8>> {
        let hits = self.search.search(&planner::plan_field_query(field, value))?;

        let mut records: Vec<Vec<u8>> = Vec::new();
        for hit in &hits {
            match self.fetch_match(hit, field, value).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(uid = %hit.uid, error = %e, "skipping hit"),
            }
        }

        let body: usize = records.iter().map(|r| r.len() + 1).sum();
        let mut out = Vec::with_capacity(body + 2);
        out.push(b'[');
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.extend_from_slice(record);
        }
        out.push(b']');
        Ok(out)
    }

    /// Resolve one hit to its record bytes.
    async fn fetch_match(&self, hit: &Hit, field: &str, value: &str) -> Result<Vec<u8>> {
        let chunk = self.block_bytes(hit).await?;
        let record = match_record_by_field(&chunk, field, value).ok_or_else(|| {
            RetrieveError::NoMatch(format!("no record where {field} == {value}"))
        })?;
        validate_json(record)?;
        Ok(record.to_vec())
    }

    /// Fetch the bytes of the block containing a hit.
    async fn block_bytes(&self, hit: &Hit) -> Result<Bytes> {
        if hit.ref_key.is_empty() {
            return Err(RetrieveError::MalformedHit.into());
        }
        let block = self.blocks.lookup(&hit.ref_key)?;
        info!(
            ref_key = %block.ref_key,
            start = block.start,
            end = block.end,
            "fetching block"
        );
        Ok(self
            .store
            .get_range(&block.address, block.start..block.end)
            .await?)
    }
}

/// Guard against corrupted bytes coming back from storage.
fn validate_json(record: &[u8]) -> Result<()> {
    serde_json::from_slice::<serde_json::Value>(record)
        .map_err(|_| RetrieveError::MalformedRecord)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, IndexError};
    use tempfile::TempDir;

    fn write_records(dir: &std::path::Path, name: &str, n: usize) {
        let mut out = String::new();
        for i in 1..=n {
            out.push_str(&format!("{{\"ID\":{i},\"Name\":\"n_{i}\"}}\n"));
        }
        std::fs::write(dir.join(name), &out).unwrap();
    }

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            storage_path: tmp.path().join("data").to_str().unwrap().to_string(),
            index_path: tmp.path().join("index"),
            port: 0,
        }
    }

    async fn test_engine(records: usize) -> (TempDir, Engine) {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        write_records(&data_dir, "a.jsonfiles", records);

        let engine = Engine::start(&test_config(&tmp)).await.unwrap();
        (tmp, engine)
    }

    #[tokio::test]
    async fn test_get_one_returns_exact_record_bytes() {
        let (_tmp, engine) = test_engine(50).await;
        let record = engine.get_one("ID", "7").await.unwrap();
        assert_eq!(record, b"{\"ID\":7,\"Name\":\"n_7\"}");
    }

    #[tokio::test]
    async fn test_get_one_from_second_block() {
        let (_tmp, engine) = test_engine(75).await;
        let record = engine.get_one("ID", "60").await.unwrap();
        assert_eq!(record, b"{\"ID\":60,\"Name\":\"n_60\"}");
    }

    #[tokio::test]
    async fn test_free_text_search() {
        let (_tmp, engine) = test_engine(75).await;
        let record = engine.search("n_42").await.unwrap();
        assert_eq!(record, b"{\"ID\":42,\"Name\":\"n_42\"}");
    }

    #[tokio::test]
    async fn test_get_many_collects_all_matches() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let mut out = String::new();
        for i in 1..=75usize {
            // Name repeats every 50 records, so n_3 appears twice.
            out.push_str(&format!("{{\"ID\":{i},\"Name\":\"n_{}\"}}\n", i % 50));
        }
        std::fs::write(data_dir.join("a.jsonfiles"), &out).unwrap();

        let engine = Engine::start(&test_config(&tmp)).await.unwrap();
        let body = engine.get_many("Name", "n_3").await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        for record in array {
            assert_eq!(record["Name"], "n_3");
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_empty() {
        let (_tmp, engine) = test_engine(50).await;
        let result = engine.get_one("ID", "999999").await;
        assert!(matches!(
            result,
            Err(Error::Index(IndexError::Empty))
        ));
    }

    #[tokio::test]
    async fn test_corrupted_line_does_not_break_neighbours() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let mut out = String::new();
        for i in 1..=75usize {
            if i == 17 {
                out.push_str("### not json at all ###\n");
            } else {
                out.push_str(&format!("{{\"ID\":{i},\"Name\":\"n_{i}\"}}\n"));
            }
        }
        std::fs::write(data_dir.join("a.jsonfiles"), &out).unwrap();

        let engine = Engine::start(&test_config(&tmp)).await.unwrap();
        let record = engine.get_one("ID", "18").await.unwrap();
        assert_eq!(record, b"{\"ID\":18,\"Name\":\"n_18\"}");
    }

    #[tokio::test]
    async fn test_reopen_skips_rebuild_and_answers_identically() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        write_records(&data_dir, "a.jsonfiles", 75);
        let config = test_config(&tmp);

        let first = Engine::start(&config).await.unwrap();
        let before = first.get_one("ID", "60").await.unwrap();
        drop(first);

        // The data directory now exists, so the second start must reopen
        // the persisted indexes instead of rescanning.
        let second = Engine::start(&config).await.unwrap();
        let after = second.get_one("ID", "60").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_missing_storage_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            storage_path: tmp
                .path()
                .join("never_created")
                .to_str()
                .unwrap()
                .to_string(),
            index_path: tmp.path().join("index"),
            port: 0,
        };
        assert!(Engine::start(&config).await.is_err());
    }
}
