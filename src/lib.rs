//! Concurrent hierarchical duration statistics for in-process
//! instrumentation.
//!
//! Callers obtain named [`StatNode`]s from a [`StatsRegistry`], record
//! operation timings with `add_time`, and read the aggregates back as
//! [`NodeSnapshot`]s. Samples flow through a multi-producer/single-consumer
//! ingest queue drained by one background task, which applies each sample
//! to its node and rolls it up through the tree until an ancestor opts out.

pub mod config;
pub mod stats;

pub use config::StatsConfig;
pub use stats::node::StatNode;
pub use stats::snapshot::{human_duration, NodeSnapshot};
pub use stats::{current_time, StatsRegistry};
