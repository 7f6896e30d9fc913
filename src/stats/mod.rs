pub mod node;
pub mod range;
pub mod snapshot;

mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StatsConfig;

use self::node::StatNode;
use self::queue::{IngestQueue, Sample};

/// Returns the engine's notion of "now", used to seed `add_time`.
pub fn current_time() -> SystemTime {
    SystemTime::now()
}

/// Entry point to a statistics tree.
///
/// Owns the root node, the ingest queue, and the drain task lifecycle.
/// Construct one per hosting service and pass it by reference. `start`
/// spawns the single drain task; `stop` shuts it down for good — the
/// lifecycle is init-once, not restartable. Samples still queued at
/// shutdown may be lost.
pub struct StatsRegistry {
    config: StatsConfig,
    root: Arc<StatNode>,
    queue: Arc<IngestQueue>,
    /// Consumer side of the ingest queue, taken by `start`.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Sample>>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StatsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRegistry")
            .field("reported_time_threshold", &self.config.reported_time_threshold)
            .field("queue_depth", &self.queue.depth())
            .finish()
    }
}

impl StatsRegistry {
    /// Creates a registry with an empty tree. The drain task is not
    /// running until `start` is called; samples submitted before that
    /// simply wait in the queue.
    pub fn new(config: StatsConfig) -> Self {
        let (queue, rx) = IngestQueue::new();
        let root = StatNode::new_root(config.reported_time_threshold, Arc::clone(&queue));

        Self {
            config,
            root,
            queue,
            rx: Mutex::new(Some(rx)),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the single drain task. Idempotent. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running.
        }

        let Some(mut rx) = self.rx.lock().take() else {
            return; // Already started once before.
        };

        let queue = Arc::clone(&self.queue);
        let backoff = self.config.drain_backoff;
        let cancel = self.cancel.clone();

        info!(
            threshold = ?self.config.reported_time_threshold,
            "stats drain task started",
        );

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    debug!("stats drain task stopped");
                    break;
                }

                match rx.try_recv() {
                    Ok(sample) => {
                        sample.node.process_time(sample.now, sample.elapsed);
                        queue.note_drained();
                    }
                    Err(TryRecvError::Empty) => {
                        tokio::time::sleep(backoff).await;
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            }
        });
    }

    /// Stops the drain task.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.running.store(false, Ordering::SeqCst);
    }

    /// The distinguished root node. Its own scalars only change when
    /// samples are recorded against it directly.
    pub fn root(&self) -> &Arc<StatNode> {
        &self.root
    }

    /// Returns the top-level node named `key`, creating it on first use.
    pub fn stat(&self, key: &str) -> Arc<StatNode> {
        self.root.stat(key)
    }

    /// Like `stat`, with the roll-up opt-out flag for new nodes.
    pub fn stat_with_options(&self, key: &str, ignore_child_updates: bool) -> Arc<StatNode> {
        self.root.stat_with_options(key, ignore_child_updates)
    }

    /// Number of samples submitted but not yet applied.
    ///
    /// The queue is unbounded: a producer rate that outruns the drain task
    /// grows this without limit. The gauge exists so hosts can watch for
    /// that instead of discovering it as memory growth.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Zeroes every node in the tree.
    pub fn reset(&self) {
        self.root.reset();
    }

    /// Zeroes the subtree at the given key path. Returns false when the
    /// path does not resolve.
    pub fn reset_path(&self, keys: &[&str]) -> bool {
        match self.root.resolve(keys) {
            Some(node) => {
                node.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_registry() -> StatsRegistry {
        StatsRegistry::new(StatsConfig::default())
    }

    /// Waits until every submitted sample has been applied.
    async fn drained(registry: &StatsRegistry) {
        for _ in 0..2_000 {
            if registry.queue_depth() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("ingest queue did not drain");
    }

    #[tokio::test]
    async fn test_add_time_flows_through_queue() {
        let registry = test_registry();
        registry.start();

        let op = registry.stat("op");
        let start = current_time() - Duration::from_millis(5);
        op.add_time(start);

        drained(&registry).await;

        let snap = op.snapshot();
        assert_eq!(snap.count, 1);
        assert!(snap.last >= Duration::from_millis(5));

        registry.stop();
    }

    #[tokio::test]
    async fn test_samples_do_not_reach_root() {
        let registry = test_registry();
        registry.start();

        registry.stat("op").add_time(current_time());
        drained(&registry).await;

        assert_eq!(registry.stat("op").snapshot().count, 1);
        assert_eq!(registry.root().snapshot().count, 0);

        registry.stop();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let registry = test_registry();
        registry.start();
        registry.start();

        registry.stat("op").add_time(current_time());
        drained(&registry).await;

        assert_eq!(registry.stat("op").snapshot().count, 1);

        registry.stop();
    }

    #[tokio::test]
    async fn test_stop_drops_later_samples() {
        let registry = test_registry();
        registry.start();
        registry.stop();

        // Give the drain task a moment to observe the cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let op = registry.stat("op");
        op.add_time(current_time());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(op.snapshot().count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_producers_exact_count() {
        use std::thread;

        const PRODUCERS: usize = 4;
        const SAMPLES: usize = 500;

        let registry = Arc::new(test_registry());
        registry.start();

        let node = registry.stat("hot");
        let mut handles = Vec::new();

        for _ in 0..PRODUCERS {
            let node = Arc::clone(&node);
            handles.push(thread::spawn(move || {
                for _ in 0..SAMPLES {
                    node.add_time(current_time());
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        drained(&registry).await;

        assert_eq!(node.snapshot().count, (PRODUCERS * SAMPLES) as u64);

        registry.stop();
    }

    #[tokio::test]
    async fn test_reset_path() {
        let registry = test_registry();
        registry.start();

        let op = registry.stat("svc").stat("op");
        op.add_time(current_time());
        drained(&registry).await;
        assert_eq!(op.snapshot().count, 1);

        assert!(registry.reset_path(&["svc"]));
        assert_eq!(op.snapshot().count, 0);
        assert!(!registry.reset_path(&["missing"]));

        registry.stop();
    }
}
