//! Scan/index pipeline: walks the backing store, splits every object into
//! records and blocks, and writes both indexes concurrently.
//!
//! Four kinds of tasks cooperate over bounded channels: object scanners
//! feeding the record and block channels, one search-indexer, one
//! block-indexer, and a status logger. The pipeline completes only after
//! both channels are drained, so a finished build is fully consistent.

use crate::block_index::BlockIndex;
use crate::error::{Error, Result};
use crate::schema::{FieldMapping, SAMPLE_SIZE};
use crate::search_index::SearchIndex;
use crate::splitter::{split_object, KeyMinter};
use crate::storage::BackingStore;
use crate::types::{BlockDescriptor, IndexDoc, BLOCK_SIZE};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Capacity of the record, block, and status channels.
pub const CHANNEL_CAPACITY: usize = BLOCK_SIZE * 2;

/// Progress is logged once per this many written documents.
const STATUS_LOG_EVERY: u64 = 30;

/// Per-document outcome reported by the indexer tasks.
#[derive(Debug)]
pub enum StatusEvent {
    Written { uid: String },
    Failed(String),
}

/// Result of a completed build.
pub struct BuildOutput {
    pub search: SearchIndex,
    pub blocks: BlockIndex,
    /// Documents written across both indexes.
    pub documents_written: u64,
}

/// Scan the whole backing store and build both indexes.
pub async fn build_indexes(store: Arc<dyn BackingStore>) -> Result<BuildOutput> {
    let objects = store.list().await?;
    info!(objects = objects.len(), "starting scan");

    let (doc_tx, doc_rx) = mpsc::channel::<IndexDoc>(CHANNEL_CAPACITY);
    let (block_tx, block_rx) = mpsc::channel::<BlockDescriptor>(CHANNEL_CAPACITY);
    let (status_tx, status_rx) = mpsc::channel::<StatusEvent>(CHANNEL_CAPACITY);

    let written = Arc::new(AtomicU64::new(0));
    let minter = Arc::new(KeyMinter::new());

    let status_task = tokio::spawn(log_status(status_rx, Arc::clone(&written)));
    let search_task = tokio::spawn(run_search_indexer(
        doc_rx,
        status_tx.clone(),
        Arc::clone(&minter),
    ));
    let block_task = tokio::spawn(run_block_indexer(
        block_rx,
        status_tx.clone(),
        Arc::clone(&minter),
    ));

    let kind = store.kind();
    let width = store.scan_width().max(1);
    futures::stream::iter(objects)
        .for_each_concurrent(width, |object| {
            let store = Arc::clone(&store);
            let minter = Arc::clone(&minter);
            let doc_tx = doc_tx.clone();
            let block_tx = block_tx.clone();
            async move {
                match store.get(&object.address).await {
                    Ok(data) => {
                        let summary =
                            split_object(&object.address, kind, &data, &minter, &doc_tx, &block_tx)
                                .await;
                        info!(
                            object = %object.address,
                            records = summary.records,
                            blocks = summary.blocks,
                            skipped = summary.skipped,
                            "scanned object"
                        );
                    }
                    Err(e) => {
                        error!(object = %object.address, error = %e, "failed to fetch object")
                    }
                }
            }
        })
        .await;

    // Closing the channels is the completion barrier for the indexers.
    drop(doc_tx);
    drop(block_tx);

    let search = search_task.await.map_err(|e| Error::Task(e.to_string()))?;
    let blocks = block_task.await.map_err(|e| Error::Task(e.to_string()))?;

    drop(status_tx);
    status_task.await.map_err(|e| Error::Task(e.to_string()))?;

    let documents_written = written.load(Ordering::Relaxed);
    info!(documents = documents_written, "built indexes");

    Ok(BuildOutput {
        search,
        blocks,
        documents_written,
    })
}

/// Consume the record channel: sample the first records to freeze the
/// field mapping, replay the sample into a fresh index, then stream the
/// remainder straight through.
async fn run_search_indexer(
    mut rx: mpsc::Receiver<IndexDoc>,
    status: mpsc::Sender<StatusEvent>,
    minter: Arc<KeyMinter>,
) -> SearchIndex {
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    while sample.len() < SAMPLE_SIZE {
        match rx.recv().await {
            Some(doc) => sample.push(doc),
            None => break,
        }
    }

    let mapping = FieldMapping::from_sample(&sample);
    info!(fields = mapping.len(), sampled = sample.len(), "built field mapping");

    let mut index = SearchIndex::new(mapping);
    for doc in &sample {
        write_document(&mut index, doc, &status, &minter).await;
    }
    while let Some(doc) = rx.recv().await {
        write_document(&mut index, &doc, &status, &minter).await;
    }

    info!("finished writing search documents");
    index
}

async fn write_document(
    index: &mut SearchIndex,
    doc: &IndexDoc,
    status: &mpsc::Sender<StatusEvent>,
    minter: &KeyMinter,
) {
    let uid = format!("mainIndex-{}", minter.next());
    index.put(&uid, doc);
    let _ = status.send(StatusEvent::Written { uid }).await;
}

/// Consume the block channel into the block index.
async fn run_block_indexer(
    mut rx: mpsc::Receiver<BlockDescriptor>,
    status: mpsc::Sender<StatusEvent>,
    minter: Arc<KeyMinter>,
) -> BlockIndex {
    let mut index = BlockIndex::new();
    while let Some(block) = rx.recv().await {
        let uid = format!("dataBlockIndex-{}", minter.next());
        let event = match index.put(&uid, block) {
            Ok(()) => StatusEvent::Written { uid },
            Err(e) => StatusEvent::Failed(e.to_string()),
        };
        let _ = status.send(event).await;
    }
    info!("finished writing block descriptors");
    index
}

/// Consume the status channel, counting writes and logging failures.
async fn log_status(mut rx: mpsc::Receiver<StatusEvent>, written: Arc<AtomicU64>) {
    while let Some(event) = rx.recv().await {
        match event {
            StatusEvent::Written { .. } => {
                let n = written.fetch_add(1, Ordering::Relaxed) + 1;
                if n % STATUS_LOG_EVERY == 0 {
                    info!(documents = n, "writing indexes");
                }
            }
            StatusEvent::Failed(err) => {
                error!(error = %err, "failed to write index document");
            }
        }
    }
}
