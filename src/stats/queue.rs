use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tracing::debug;

use super::node::StatNode;

/// A single observation submitted for aggregation.
///
/// Entries are consumed exactly once, in per-producer submission order.
/// No ordering is guaranteed across producers.
pub(crate) struct Sample {
    pub(crate) node: Arc<StatNode>,
    pub(crate) now: SystemTime,
    pub(crate) elapsed: Duration,
}

/// Multi-producer/single-consumer buffer between `add_time` call sites and
/// the drain task.
///
/// Producers append without contending on per-node locks; the single drain
/// task applies each sample with `process_time`. The channel is unbounded: a
/// producer rate that outruns the drain task grows memory without bound,
/// which `depth` surfaces rather than hides.
pub(crate) struct IngestQueue {
    tx: mpsc::UnboundedSender<Sample>,
    depth: AtomicUsize,
}

impl IngestQueue {
    /// Creates the queue and hands back the consumer side.
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                depth: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Appends a sample. Never blocks; after shutdown the sample is dropped.
    pub(crate) fn enqueue(&self, sample: Sample) {
        if self.tx.send(sample).is_ok() {
            self.depth.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("ingest queue closed, sample dropped");
        }
    }

    /// Records that the drain task consumed one sample.
    pub(crate) fn note_drained(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of samples submitted but not yet applied.
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}
