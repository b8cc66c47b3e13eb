//! Record/block splitter: line-frames an object's bytes, emits one index
//! document per record and one block descriptor per BLOCK_SIZE records.
//!
//! The same line framing is reused on the read path to rescan a fetched
//! block for the record a query asked for.

use crate::types::{BlockDescriptor, IndexDoc, BLOCK_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// Mints process-unique components for ref keys and document uids.
///
/// The prefix ties keys to one process start, the counter makes them
/// collision-free within it.
pub struct KeyMinter {
    prefix: String,
    seq: AtomicU64,
}

impl KeyMinter {
    pub fn new() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self {
            prefix: format!("{:x}{:x}", std::process::id(), nanos),
            seq: AtomicU64::new(0),
        }
    }

    /// Next unique key component.
    pub fn next(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }

    /// Ref key for a new block of `address`.
    pub fn ref_key(&self, address: &str) -> String {
        format!("{}-{}-{}", address, self.next(), BLOCK_SIZE)
    }
}

impl Default for KeyMinter {
    fn default() -> Self {
        Self::new()
    }
}

/// One line of an object, with its byte span.
///
/// `end` points one past the line's newline so that consecutive frames
/// tile the object exactly; the `line` slice excludes the line break.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub start: u64,
    pub end: u64,
    pub line: &'a [u8],
}

/// Iterator over newline-delimited frames of a byte buffer.
pub struct LineFrames<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LineFrames<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for LineFrames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.data[start..];
        let (line_len, advance) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => (i, i + 1),
            None => (rest.len(), rest.len()),
        };
        let mut line = &rest[..line_len];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        self.pos = start + advance;
        Some(Frame {
            start: start as u64,
            end: (start + advance) as u64,
            line,
        })
    }
}

/// Counters reported back from one object's scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitSummary {
    /// Records successfully parsed and emitted.
    pub records: usize,
    /// Block descriptors emitted.
    pub blocks: usize,
    /// Lines skipped because they did not parse as a JSON object.
    pub skipped: usize,
}

/// Split one object's bytes into index documents and block descriptors.
///
/// Lines that fail to parse are skipped and do not consume a block slot.
/// A block descriptor covering the tail range is always emitted, so an
/// empty object yields exactly one zero-length descriptor. Records of
/// block N carry the ref key minted when block N started; the descriptor
/// for block N is emitted after its last record.
pub async fn split_object(
    address: &str,
    store_kind: &str,
    data: &[u8],
    minter: &KeyMinter,
    doc_tx: &mpsc::Sender<IndexDoc>,
    block_tx: &mpsc::Sender<BlockDescriptor>,
) -> SplitSummary {
    let mut summary = SplitSummary::default();
    let mut block_start: u64 = 0;
    let mut ref_key = minter.ref_key(address);
    let mut pos: u64 = 0;

    for frame in LineFrames::new(data) {
        pos = frame.end;

        let object = match serde_json::from_slice::<serde_json::Value>(frame.line) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(object = %address, offset = frame.start, "skipping unparseable record");
                summary.skipped += 1;
                continue;
            }
        };

        // This record opens a new block: seal the previous one at the
        // record's own start offset and rotate the ref key.
        if summary.records > 0 && summary.records % BLOCK_SIZE == 0 {
            let block = BlockDescriptor {
                ref_key: std::mem::replace(&mut ref_key, minter.ref_key(address)),
                start: block_start,
                end: frame.start,
                address: address.to_string(),
                store_kind: store_kind.to_string(),
            };
            block_start = frame.start;
            if block_tx.send(block).await.is_err() {
                warn!(object = %address, "block channel closed, aborting scan");
                return summary;
            }
            summary.blocks += 1;
        }

        let doc = IndexDoc::from_object(&ref_key, &object);
        if doc_tx.send(doc).await.is_err() {
            warn!(object = %address, "record channel closed, aborting scan");
            return summary;
        }
        summary.records += 1;
    }

    // The tail block always exists, even for an empty object.
    let block = BlockDescriptor {
        ref_key,
        start: block_start,
        end: pos,
        address: address.to_string(),
        store_kind: store_kind.to_string(),
    };
    if block_tx.send(block).await.is_ok() {
        summary.blocks += 1;
    }
    summary
}

/// Find the first record in a block whose `field` stringifies to `value`.
///
/// Strings compare directly; integers and floats compare in integer form;
/// booleans compare as `true`/`false`. Lines that fail to parse are
/// ignored.
pub fn match_record_by_field<'a>(chunk: &'a [u8], field: &str, value: &str) -> Option<&'a [u8]> {
    for frame in LineFrames::new(chunk) {
        let record: serde_json::Value = match serde_json::from_slice(frame.line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let Some(found) = record.get(field) else {
            continue;
        };
        let matched = match found {
            serde_json::Value::String(s) => s == value,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => i.to_string() == value,
                None => n
                    .as_f64()
                    .map(|f| (f as i64).to_string() == value)
                    .unwrap_or(false),
            },
            serde_json::Value::Bool(b) => b.to_string() == value,
            _ => false,
        };
        if matched {
            return Some(frame.line);
        }
    }
    None
}

/// Find the first record in a block whose raw bytes contain `needle`.
pub fn match_record_containing<'a>(chunk: &'a [u8], needle: &str) -> Option<&'a [u8]> {
    LineFrames::new(chunk)
        .find(|frame| String::from_utf8_lossy(frame.line).contains(needle))
        .map(|frame| frame.line)
}
