//! Live Timing Statistics
//!
//! A bounded buffer of nanosecond-duration samples for one metric (cpu,
//! draw, submit, gpu, gpu_delay, total). Once the buffer fills, the
//! median/mean/worst are computed and the buffer is reset, mirroring
//! `u_live_stats_ns`.

/// Maximum number of samples held before a metric is forced to reset.
pub const MAX_SAMPLES: usize = 1024;

/// A single metric's bounded sample buffer.
#[derive(Debug, Clone)]
pub struct SampleStats {
    name: &'static str,
    values: Vec<u64>,
}

/// Median, mean, and worst (max) of a reset batch of samples, all in
/// nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSummary {
    pub median_ns: u64,
    pub mean_ns: u64,
    pub worst_ns: u64,
}

impl SampleStats {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, values: Vec::with_capacity(MAX_SAMPLES) }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Adds a sample. Returns `true` if the buffer is now full (either it
    /// was already full before this call, or this call filled it) — the
    /// caller should then call [`SampleStats::get_and_reset`].
    pub fn add(&mut self, value_ns: u64) -> bool {
        if self.values.len() >= MAX_SAMPLES {
            return true;
        }
        self.values.push(value_ns);
        self.values.len() >= MAX_SAMPLES
    }

    /// Computes median/mean/worst over the current batch and clears it.
    /// Returns the zeroed summary if no samples were collected.
    pub fn get_and_reset(&mut self) -> StatsSummary {
        if self.values.is_empty() {
            return StatsSummary::default();
        }

        self.values.sort_unstable();
        let count = self.values.len();
        let worst_ns = self.values[count - 1];
        let median_ns = self.values[count / 2];
        // Matches the source's per-sample division-then-accumulate, which
        // avoids overflow on very large sample counts at the cost of a
        // small amount of rounding error.
        let mean_ns = self.values.iter().map(|v| v / count as u64).sum();

        self.values.clear();
        StatsSummary { median_ns, mean_ns, worst_ns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_is_zeroed() {
        let mut s = SampleStats::new("test");
        assert_eq!(s.get_and_reset(), StatsSummary::default());
    }

    #[test]
    fn median_mean_worst_of_known_values() {
        let mut s = SampleStats::new("test");
        for v in [10u64, 20, 30, 40, 50] {
            s.add(v);
        }
        let summary = s.get_and_reset();
        assert_eq!(summary.median_ns, 30);
        assert_eq!(summary.worst_ns, 50);
        assert_eq!(summary.mean_ns, 30);
    }

    #[test]
    fn buffer_reports_full_at_capacity() {
        let mut s = SampleStats::new("test");
        let mut full = false;
        for i in 0..MAX_SAMPLES {
            full = s.add(i as u64);
        }
        assert!(full);
        // One more add without a reset in between still reports full.
        assert!(s.add(0));
    }
}
