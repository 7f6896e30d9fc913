use std::time::{Duration, SystemTime};

/// Point-in-time view of one node's aggregates.
///
/// Taken under the node's read lock, so it is internally consistent and
/// safe to build while writers are active on other nodes. `first`/`last`
/// reflect queue-drain order, which is best-effort across concurrent
/// producers.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub key: String,
    pub count: u64,
    pub total: Duration,
    pub first: Duration,
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
    pub first_time: Option<SystemTime>,
    pub last_time: Option<SystemTime>,
    pub hide_total: bool,
    pub has_children: bool,
}

impl NodeSnapshot {
    /// Arithmetic mean of the recorded durations, zero when empty.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }

        Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
    }
}

/// Renders a duration as whole time units, e.g. "2 minutes 5 seconds".
///
/// Sub-second durations render as "0 seconds"; fractional seconds are
/// truncated.
pub fn human_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(unit(days, "day"));
    }
    if days > 0 || hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if total_secs > 0 {
        parts.push(unit(seconds, "second"));
    }

    if parts.is_empty() {
        return "0 seconds".to_string();
    }

    parts.join(" ")
}

fn unit(n: u64, name: &str) -> String {
    if n == 1 {
        format!("{n} {name}")
    } else {
        format!("{n} {name}s")
    }
}
