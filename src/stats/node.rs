use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::warn;

use super::queue::{IngestQueue, Sample};
use super::range::SizeRange;
use super::snapshot::NodeSnapshot;

/// Running aggregates for a single node.
///
/// `count == 0` means every other field is at its zero value. `first`/`last`
/// reflect queue-drain order, which is best-effort across concurrent
/// producers.
#[derive(Clone, Copy, Default)]
struct Scalars {
    count: u64,
    total: Duration,
    first: Duration,
    last: Duration,
    min: Duration,
    max: Duration,
    first_time: Option<SystemTime>,
    last_time: Option<SystemTime>,
}

/// A named point in the statistics tree.
///
/// Nodes are created once via get-or-create and never deleted; `reset`
/// zeroes the aggregates without touching structure or flags. Scalars sit
/// behind a per-node `RwLock` so readers of one node never contend with
/// writers of another; the child map supports concurrent get-or-create and
/// iteration independently of the scalar locks.
pub struct StatNode {
    key: String,
    parent: Weak<StatNode>,
    pub(crate) children: DashMap<String, Arc<StatNode>>,
    pub(crate) range: Option<SizeRange>,
    ignore_child_updates: bool,
    hide_total: AtomicBool,
    reported_time_threshold: Duration,
    queue: Arc<IngestQueue>,
    scalars: RwLock<Scalars>,
}

impl std::fmt::Debug for StatNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatNode")
            .field("key", &self.key)
            .field("ignore_child_updates", &self.ignore_child_updates)
            .field("children", &self.children.len())
            .finish()
    }
}

impl StatNode {
    /// Creates the distinguished root node.
    ///
    /// The root opts out of child roll-ups, so its own scalars only change
    /// when samples are recorded against it directly.
    pub(crate) fn new_root(
        reported_time_threshold: Duration,
        queue: Arc<IngestQueue>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: "root".to_string(),
            parent: Weak::new(),
            children: DashMap::new(),
            range: None,
            ignore_child_updates: true,
            hide_total: AtomicBool::new(false),
            reported_time_threshold,
            queue,
            scalars: RwLock::new(Scalars::default()),
        })
    }

    /// Returns the child named `key`, creating it on first use.
    ///
    /// Equivalent to `stat_with_options(key, false)`.
    pub fn stat(self: &Arc<Self>, key: &str) -> Arc<StatNode> {
        self.stat_with_options(key, false)
    }

    /// Returns the child named `key`, creating it on first use.
    ///
    /// With `ignore_child_updates` set, samples applied to this node's
    /// descendants do not roll up past it. The flag is fixed on first
    /// creation: if the key already exists, a differing argument is
    /// silently ignored.
    pub fn stat_with_options(
        self: &Arc<Self>,
        key: &str,
        ignore_child_updates: bool,
    ) -> Arc<StatNode> {
        self.get_or_create(key, ignore_child_updates, None)
    }

    /// Atomic get-or-create. Concurrent callers creating the same key all
    /// observe a single instance; a losing candidate is never reachable.
    pub(crate) fn get_or_create(
        self: &Arc<Self>,
        key: &str,
        ignore_child_updates: bool,
        range: Option<SizeRange>,
    ) -> Arc<StatNode> {
        if let Some(existing) = self.children.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.children.entry(key.to_string()).or_insert_with(|| {
            Arc::new(StatNode {
                key: key.to_string(),
                parent: Arc::downgrade(self),
                children: DashMap::new(),
                range,
                ignore_child_updates,
                hide_total: AtomicBool::new(false),
                reported_time_threshold: self.reported_time_threshold,
                queue: Arc::clone(&self.queue),
                scalars: RwLock::new(Scalars::default()),
            })
        });

        Arc::clone(entry.value())
    }

    /// Records the time elapsed since `start` against this node.
    ///
    /// The sample is submitted to the ingest queue and applied by the drain
    /// task; the returned timestamp can seed the next measurement. A start
    /// time in the future (clock skew or misuse) is logged and dropped.
    pub fn add_time(self: &Arc<Self>, start: SystemTime) -> SystemTime {
        let now = SystemTime::now();

        let elapsed = match now.duration_since(start) {
            Ok(elapsed) => elapsed,
            Err(_) => {
                warn!(key = %self.key, "start time is in the future, sample dropped");
                return now;
            }
        };

        self.queue.enqueue(Sample {
            node: Arc::clone(self),
            now,
            elapsed,
        });

        now
    }

    /// Records the time elapsed since `start` against the range bucket
    /// covering `sample_size`.
    ///
    /// The bucket is updated synchronously, bypassing the ingest queue. A
    /// sample size no configured bucket covers is logged and dropped
    /// entirely.
    pub fn add_time_for_range(&self, start: SystemTime, sample_size: u64) -> SystemTime {
        let now = SystemTime::now();

        let elapsed = match now.duration_since(start) {
            Ok(elapsed) => elapsed,
            Err(_) => {
                warn!(key = %self.key, "start time is in the future, sample dropped");
                return now;
            }
        };

        match self.classify(sample_size) {
            Some(bucket) => bucket.process_time(now, elapsed),
            None => {
                warn!(
                    key = %self.key,
                    sample_size,
                    "sample size does not fit into any range, sample dropped",
                );
            }
        }

        now
    }

    /// Applies one sample to this node and rolls it up to ancestors.
    ///
    /// Durations above the reported-time threshold are logged and discarded
    /// without mutating anything. Roll-up reuses the same timestamp and
    /// duration and stops before the first ancestor that ignores child
    /// updates.
    pub fn process_time(&self, now: SystemTime, duration: Duration) {
        if duration > self.reported_time_threshold {
            warn!(
                key = %self.key,
                duration = ?duration,
                threshold = ?self.reported_time_threshold,
                "duration exceeds reported time threshold, sample dropped",
            );
            return;
        }

        {
            let mut scalars = self.scalars.write();

            scalars.last_time = Some(now);
            scalars.last = duration;

            if scalars.count == 0 {
                scalars.first_time = Some(now);
                scalars.first = duration;
                scalars.min = duration;
                scalars.max = duration;
            } else {
                if duration < scalars.min {
                    scalars.min = duration;
                }
                if duration > scalars.max {
                    scalars.max = duration;
                }
            }

            scalars.total += duration;
            scalars.count += 1;
        }

        if let Some(parent) = self.parent.upgrade() {
            if !parent.ignore_child_updates {
                parent.process_time(now, duration);
            }
        }
    }

    /// Zeroes this node's aggregates and, recursively, every descendant's.
    ///
    /// Structure, flags, and bucket bounds are untouched. Racing writers
    /// may land a sample on either side of the reset; this is best-effort,
    /// not transactional.
    pub fn reset(&self) {
        *self.scalars.write() = Scalars::default();

        for child in self.children.iter() {
            child.value().reset();
        }
    }

    /// Returns a point-in-time copy of this node's aggregates.
    pub fn snapshot(&self) -> NodeSnapshot {
        let scalars = *self.scalars.read();

        NodeSnapshot {
            key: self.key.clone(),
            count: scalars.count,
            total: scalars.total,
            first: scalars.first,
            last: scalars.last,
            min: scalars.min,
            max: scalars.max,
            first_time: scalars.first_time,
            last_time: scalars.last_time,
            hide_total: self.hide_total.load(Ordering::Relaxed),
            has_children: !self.children.is_empty(),
        }
    }

    /// Node name, unique among siblings.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether descendant samples stop rolling up at this node.
    pub fn ignores_child_updates(&self) -> bool {
        self.ignore_child_updates
    }

    /// Marks the total column as hidden for presentation consumers.
    pub fn set_hide_total(&self, hide: bool) {
        self.hide_total.store(hide, Ordering::Relaxed);
    }

    /// Returns the child named `key` without creating it.
    pub fn child(&self, key: &str) -> Option<Arc<StatNode>> {
        self.children.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Child names, in no particular order.
    pub fn child_keys(&self) -> Vec<String> {
        self.children.iter().map(|c| c.key().clone()).collect()
    }

    /// Current children, in no particular order. Safe to call while
    /// siblings are being created or updated.
    pub fn children(&self) -> Vec<Arc<StatNode>> {
        self.children
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect()
    }

    /// Walks a sequence of child keys from this node.
    pub fn resolve(self: &Arc<Self>, keys: &[&str]) -> Option<Arc<StatNode>> {
        let mut node = Arc::clone(self);
        for key in keys {
            node = node.child(key)?;
        }
        Some(node)
    }
}
