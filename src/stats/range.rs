use std::sync::Arc;

use super::node::StatNode;

/// Numeric bounds for a bucket child. `upper == None` means unbounded
/// above; the lower bound is inclusive, the upper exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeRange {
    pub(crate) lower: u64,
    pub(crate) upper: Option<u64>,
}

impl SizeRange {
    pub(crate) fn contains(&self, size: u64) -> bool {
        self.lower <= size && self.upper.map_or(true, |upper| size < upper)
    }

    fn label(&self) -> String {
        match self.upper {
            Some(upper) => format!(
                "{} - {}",
                format_thousands(self.lower),
                format_thousands(upper)
            ),
            None => format!("{} -", format_thousands(self.lower)),
        }
    }
}

impl StatNode {
    /// Partitions this node's children into size buckets.
    ///
    /// Sorted thresholds `[r0, r1, …, rn]` produce one bucket per
    /// consecutive pair plus an unbounded top bucket `[rn, +∞)`. Labels
    /// are the thousands-separated boundaries, e.g. `"100 - 1,000"` and
    /// `"10,000 -"`. Values below `r0` are not covered by any bucket.
    /// Calling this again is additive: buckets that already exist are left
    /// as they are.
    pub fn add_ranges(self: &Arc<Self>, thresholds: &[u64]) {
        if thresholds.is_empty() {
            return;
        }

        let mut sorted = thresholds.to_vec();
        sorted.sort_unstable();

        for (i, &lower) in sorted.iter().enumerate() {
            let range = SizeRange {
                lower,
                upper: sorted.get(i + 1).copied(),
            };
            self.get_or_create(&range.label(), false, Some(range));
        }
    }

    /// Returns the bucket child covering `size`.
    ///
    /// Linear scan over the bucket children; named (non-bucket) children
    /// are skipped. Returns `None` when no configured bucket covers the
    /// value.
    pub fn classify(&self, size: u64) -> Option<Arc<StatNode>> {
        for child in self.children.iter() {
            if let Some(range) = child.value().range {
                if range.contains(size) {
                    return Some(Arc::clone(child.value()));
                }
            }
        }

        None
    }
}

/// Formats an integer with comma thousands separators.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}
