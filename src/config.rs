//! Compositor Configuration
//!
//! This module defines the environment-driven configuration read once at
//! startup by the compositor core.
//!
//! # Example
//!
//! ```rust,ignore
//! use compositor_core::config::CompositorConfig;
//!
//! let config = CompositorConfig::from_env();
//! ```

use glam::Vec3;

/// Configuration options for the frame pacer and tracking origin.
///
/// Every field is sourced from an environment variable at process
/// startup via [`CompositorConfig::from_env`], with the same
/// default-and-clamp behaviour as the runtime this core was modelled on.
///
/// | Field | Env var | Default | Clamp |
/// |-------|---------|---------|-------|
/// | `present_to_display_offset_ns` | `COMPOSITOR_PRESENT_TO_DISPLAY_OFFSET_MS` | 4.0 ms | `[1, 40]` ms |
/// | `min_composition_budget_ns` | `COMPOSITOR_MIN_TIME_MS` | 3.0 ms | none |
/// | `live_stats` | `COMPOSITOR_LIVE_STATS` | `false` | n/a |
/// | `tracking_origin_offset` | `TRACKING_ORIGIN_OFFSET_{X,Y,Z}` | `(0,0,0)` | none |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorConfig {
    /// Offset added to the desired present time to predict display time,
    /// in nanoseconds.
    pub present_to_display_offset_ns: u64,

    /// Lower bound on the per-frame composition budget, in nanoseconds.
    pub min_composition_budget_ns: u64,

    /// Whether the pacer should periodically print median/mean/worst
    /// timing statistics.
    pub live_stats: bool,

    /// Offset applied to all tracking-origin anchors at startup.
    pub tracking_origin_offset: Vec3,
}

const DEFAULT_PRESENT_TO_DISPLAY_OFFSET_MS: f32 = 4.0;
const PRESENT_TO_DISPLAY_OFFSET_CLAMP_MS: (f32, f32) = (1.0, 40.0);
const DEFAULT_MIN_TIME_MS: f32 = 3.0;

impl CompositorConfig {
    /// Reads configuration from the environment, applying the same
    /// defaults and clamps the compositor has always used.
    #[must_use]
    pub fn from_env() -> Self {
        let offset_ms = env_f32("COMPOSITOR_PRESENT_TO_DISPLAY_OFFSET_MS", DEFAULT_PRESENT_TO_DISPLAY_OFFSET_MS)
            .clamp(PRESENT_TO_DISPLAY_OFFSET_CLAMP_MS.0, PRESENT_TO_DISPLAY_OFFSET_CLAMP_MS.1);
        let min_time_ms = env_f32("COMPOSITOR_MIN_TIME_MS", DEFAULT_MIN_TIME_MS);

        Self {
            present_to_display_offset_ns: ms_to_ns(offset_ms),
            min_composition_budget_ns: ms_to_ns(min_time_ms),
            live_stats: env_bool("COMPOSITOR_LIVE_STATS", false),
            tracking_origin_offset: Vec3::new(
                env_f32("TRACKING_ORIGIN_OFFSET_X", 0.0),
                env_f32("TRACKING_ORIGIN_OFFSET_Y", 0.0),
                env_f32("TRACKING_ORIGIN_OFFSET_Z", 0.0),
            ),
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            present_to_display_offset_ns: ms_to_ns(DEFAULT_PRESENT_TO_DISPLAY_OFFSET_MS),
            min_composition_budget_ns: ms_to_ns(DEFAULT_MIN_TIME_MS),
            live_stats: false,
            tracking_origin_offset: Vec3::ZERO,
        }
    }
}

fn ms_to_ns(ms: f32) -> u64 {
    (ms * 1_000_000.0) as u64
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "True"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = CompositorConfig::default();
        assert_eq!(config.present_to_display_offset_ns, 4_000_000);
        assert_eq!(config.min_composition_budget_ns, 3_000_000);
        assert!(!config.live_stats);
        assert_eq!(config.tracking_origin_offset, Vec3::ZERO);
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        // SAFETY: test runs single-threaded with respect to this var.
        unsafe { std::env::set_var("COMPOSITOR_LIVE_STATS_TEST_PROBE", "true") };
        assert!(env_bool("COMPOSITOR_LIVE_STATS_TEST_PROBE", false));
        unsafe { std::env::remove_var("COMPOSITOR_LIVE_STATS_TEST_PROBE") };
    }
}
