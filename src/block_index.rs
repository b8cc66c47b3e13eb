//! Block index: maps a ref key to the descriptor locating its block.

use crate::error::IndexError;
use crate::types::BlockDescriptor;
use rkyv::rancor::Error as RkyvError;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// File holding the archived descriptors inside the data directory.
const BLOCKS_FILE: &str = "blocks.bin";

/// Archived on-disk form: descriptors plus their write-time uids.
#[derive(Debug, Archive, Serialize, Deserialize)]
struct BlockIndexArchive {
    uids: Vec<String>,
    blocks: Vec<BlockDescriptor>,
}

/// Lookup table from ref key to block descriptor.
///
/// Exactly one descriptor is expected per ref key; the scan pipeline
/// guarantees uniqueness, and `lookup` enforces it.
#[derive(Debug, Default)]
pub struct BlockIndex {
    uids: Vec<String>,
    blocks: Vec<BlockDescriptor>,
    by_ref: HashMap<String, Vec<u32>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn descriptors(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    /// Store a descriptor under its write-time uid. A ref key landing a
    /// second descriptor is recorded but reported as an error.
    pub fn put(&mut self, uid: &str, block: BlockDescriptor) -> Result<(), IndexError> {
        let slot = self.blocks.len() as u32;
        let entries = self.by_ref.entry(block.ref_key.clone()).or_default();
        entries.push(slot);
        let duplicate = entries.len() > 1;
        let ref_key = block.ref_key.clone();

        self.uids.push(uid.to_string());
        self.blocks.push(block);

        if duplicate {
            return Err(IndexError::Ambiguous(ref_key));
        }
        Ok(())
    }

    /// Fetch the single descriptor for a ref key.
    pub fn lookup(&self, ref_key: &str) -> Result<&BlockDescriptor, IndexError> {
        match self.by_ref.get(ref_key) {
            None => Err(IndexError::NotFound(ref_key.to_string())),
            Some(entries) if entries.len() > 1 => {
                Err(IndexError::Ambiguous(ref_key.to_string()))
            }
            Some(entries) => Ok(&self.blocks[entries[0] as usize]),
        }
    }

    /// Write the index into `dir` as a single archive file.
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(internal)?;
        let archive = BlockIndexArchive {
            uids: self.uids.clone(),
            blocks: self.blocks.clone(),
        };
        let bytes = rkyv::to_bytes::<RkyvError>(&archive).map_err(internal)?;
        std::fs::write(dir.join(BLOCKS_FILE), &bytes).map_err(internal)?;
        Ok(())
    }

    /// Load an index previously written by `persist`.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(dir.join(BLOCKS_FILE)).map_err(internal)?;
        let archive = rkyv::from_bytes::<BlockIndexArchive, RkyvError>(&bytes).map_err(internal)?;

        let mut by_ref: HashMap<String, Vec<u32>> = HashMap::new();
        for (i, block) in archive.blocks.iter().enumerate() {
            by_ref.entry(block.ref_key.clone()).or_default().push(i as u32);
        }

        Ok(Self {
            uids: archive.uids,
            blocks: archive.blocks,
            by_ref,
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

    fn block(ref_key: &str, start: u64, end: u64) -> BlockDescriptor {
        BlockDescriptor {
            ref_key: ref_key.to_string(),
            start,
            end,
            address: "a.jsonfiles".to_string(),
            store_kind: "LocalFS".to_string(),
        }
    }

    #[test]
    fn test_put_and_lookup() {
        let mut index = BlockIndex::new();
        index.put("dataBlockIndex-1", block("k1", 0, 100)).unwrap();
        index.put("dataBlockIndex-2", block("k2", 100, 180)).unwrap();

        let found = index.lookup("k2").unwrap();
        assert_eq!(found.start, 100);
        assert_eq!(found.end, 180);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_lookup_missing_ref_key() {
        let index = BlockIndex::new();
        assert!(matches!(
            index.lookup("nope"),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_ref_key_is_ambiguous() {
        let mut index = BlockIndex::new();
        index.put("dataBlockIndex-1", block("k1", 0, 100)).unwrap();
        let result = index.put("dataBlockIndex-2", block("k1", 100, 180));
        assert!(matches!(result, Err(IndexError::Ambiguous(_))));

        assert!(matches!(
            index.lookup("k1"),
            Err(IndexError::Ambiguous(_))
        ));
    }

    #[test]
    fn test_persist_and_open_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut index = BlockIndex::new();
        index.put("dataBlockIndex-1", block("k1", 0, 100)).unwrap();
        index.put("dataBlockIndex-2", block("k2", 100, 180)).unwrap();
        index.persist(tmp.path()).unwrap();

        let reopened = BlockIndex::open(tmp.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.lookup("k1").unwrap().end, 100);
    }
}
