//! Process-Unique Id Generator
//!
//! A single process-wide monotonic counter used to key caches of imported
//! images so that re-allocation of a heap address cannot yield a false
//! cache hit. Modeled as a library-scoped atomic accessed via a free
//! function; no teardown is required because the counter owns no
//! resources.

use std::sync::atomic::{AtomicU64, Ordering};

static GENERATOR: AtomicU64 = AtomicU64::new(0);

/// A process-unique, strictly monotonically increasing, never-zero id.
pub type UniqueId = u64;

/// Returns the next process-unique id. Never returns 0.
#[must_use]
pub fn next_unique_id() -> UniqueId {
    GENERATOR.fetch_add(1, Ordering::Relaxed) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_returns_zero() {
        for _ in 0..16 {
            assert_ne!(next_unique_id(), 0);
        }
    }

    #[test]
    fn strictly_increasing() {
        let a = next_unique_id();
        let b = next_unique_id();
        assert!(b > a);
    }
}
