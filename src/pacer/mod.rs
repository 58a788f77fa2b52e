//! Frame Pacer
//!
//! Produces per-frame timing predictions (wake-up/present/display),
//! records the actual marks the orchestrator makes as a frame moves
//! through its lifecycle, and surfaces rolling statistics. Modeled
//! directly on the fake-timing pacer this runtime falls back to when no
//! richer presentation-time feedback is available.
//!
//! Intended to be driven from a single thread (the compositor thread); it
//! holds no internal locking.

mod stats;

pub use stats::{SampleStats, StatsSummary};

use crate::config::CompositorConfig;

/// Number of frame slots kept in the ring. A mark referring to a frame id
/// whose slot now holds a different (newer) id is silently dropped.
const FRAME_COUNT: usize = 8;

const HALF_MS_NS: u64 = 500_000;

/// The point in a frame's lifecycle a [`FramePacer::mark_point`] call
/// reports having reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPoint {
    WakeUp,
    Begin,
    SubmitBegin,
    SubmitEnd,
}

/// One frame's predicted and actual timestamps, addressed by `id % FRAME_COUNT`.
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    id: i64,
    predicted_wake_ns: u64,
    predicted_present_ns: u64,
    predicted_display_ns: u64,
    predicted_period_ns: u64,
    woke_ns: u64,
    began_ns: u64,
    submit_began_ns: u64,
    submit_end_ns: u64,
    gpu_start_ns: u64,
    gpu_end_ns: u64,
}

/// Everything [`FramePacer::predict`] hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrediction {
    pub frame_id: i64,
    pub wake_up_ns: u64,
    pub desired_present_ns: u64,
    pub present_slop_ns: u64,
    pub predicted_display_ns: u64,
    pub predicted_display_period_ns: u64,
    pub min_display_period_ns: u64,
}

/// Predict/mark/info state machine estimating wake-up, present, and
/// display times for a frame-paced compositor without hardware display
/// timing feedback.
pub struct FramePacer {
    frame_period_ns: u64,
    last_present_ns: u64,
    present_to_display_offset_ns: u64,
    composition_budget_ns: u64,
    frame_id_generator: i64,
    frames: [Frame; FRAME_COUNT],
    live_stats: bool,

    cpu: SampleStats,
    draw: SampleStats,
    submit: SampleStats,
    gpu: SampleStats,
    gpu_delay: SampleStats,
    total: SampleStats,
}

impl FramePacer {
    /// Creates a pacer for a display refreshing every `frame_period_ns`,
    /// as observed at `now_ns`.
    #[must_use]
    pub fn new(frame_period_ns: u64, now_ns: u64, config: &CompositorConfig) -> Self {
        let twenty_percent_ns = frame_period_ns / 5;
        let composition_budget_ns = twenty_percent_ns.max(config.min_composition_budget_ns);

        Self {
            frame_period_ns,
            // Make the next present time be in the future.
            last_present_ns: now_ns + 50 * 1_000_000,
            present_to_display_offset_ns: config.present_to_display_offset_ns,
            composition_budget_ns,
            frame_id_generator: 0,
            frames: [Frame::default(); FRAME_COUNT],
            live_stats: config.live_stats,
            cpu: SampleStats::new("cpu"),
            draw: SampleStats::new("draw"),
            submit: SampleStats::new("submit"),
            gpu: SampleStats::new("gpu"),
            gpu_delay: SampleStats::new("gpu_delay"),
            total: SampleStats::new("total"),
        }
    }

    fn slot(&self, id: i64) -> usize {
        (id as u64 % FRAME_COUNT as u64) as usize
    }

    /// Allocates the next frame id, writes a fresh slot, and returns the
    /// full set of predictions for it.
    pub fn predict(&mut self, now_ns: u64) -> FramePrediction {
        let frame_id = self.frame_id_generator;
        self.frame_id_generator += 1;

        let mut desired_present_ns = self.last_present_ns + self.frame_period_ns;
        while now_ns + self.composition_budget_ns > desired_present_ns {
            desired_present_ns += self.frame_period_ns;
        }

        let predicted_display_ns = desired_present_ns + self.present_to_display_offset_ns;
        let wake_up_ns = desired_present_ns - self.composition_budget_ns;

        let slot = self.slot(frame_id);
        self.frames[slot] = Frame {
            id: frame_id,
            predicted_wake_ns: wake_up_ns,
            predicted_present_ns: desired_present_ns,
            predicted_display_ns,
            predicted_period_ns: self.frame_period_ns,
            ..Frame::default()
        };

        FramePrediction {
            frame_id,
            wake_up_ns,
            desired_present_ns,
            present_slop_ns: HALF_MS_NS,
            predicted_display_ns,
            predicted_display_period_ns: self.frame_period_ns,
            min_display_period_ns: self.frame_period_ns,
        }
    }

    fn frame_mut(&mut self, frame_id: i64) -> Option<&mut Frame> {
        let slot = self.slot(frame_id);
        let frame = &mut self.frames[slot];
        (frame.id == frame_id).then_some(frame)
    }

    /// Records that `frame_id` reached `point` at `when_ns`. Silently
    /// dropped if the frame's slot has since been overwritten by a newer
    /// frame (the frame was overrun).
    pub fn mark_point(&mut self, point: TimingPoint, frame_id: i64, when_ns: u64) {
        let live_stats = self.live_stats;
        let Some(frame) = self.frame_mut(frame_id) else { return };

        match point {
            TimingPoint::WakeUp => frame.woke_ns = when_ns,
            TimingPoint::Begin => frame.began_ns = when_ns,
            TimingPoint::SubmitBegin => frame.submit_began_ns = when_ns,
            TimingPoint::SubmitEnd => {
                frame.submit_end_ns = when_ns;
                if live_stats {
                    let cpu_ns = frame.began_ns.saturating_sub(frame.woke_ns);
                    let draw_ns = frame.submit_began_ns.saturating_sub(frame.began_ns);
                    let submit_ns = frame.submit_end_ns.saturating_sub(frame.submit_began_ns);
                    self.record_and_maybe_print(cpu_ns, draw_ns, submit_ns);
                }
            }
        }
    }

    fn record_and_maybe_print(&mut self, cpu_ns: u64, draw_ns: u64, submit_ns: u64) {
        let mut full = false;
        full |= self.cpu.add(cpu_ns);
        full |= self.draw.add(draw_ns);
        full |= self.submit.add(submit_ns);
        if full {
            self.print_and_reset();
        }
    }

    /// Present-time feedback from the presentation engine. The fake pacer
    /// this is modeled on ignores the values: it has no display-timing
    /// feedback loop to correct, but the call must still be accepted so
    /// the orchestrator doesn't need to special-case which pacer backend
    /// is active.
    #[allow(clippy::unused_self)]
    pub fn info_present(
        &mut self,
        _frame_id: i64,
        _desired_ns: u64,
        _actual_ns: u64,
        _earliest_ns: u64,
        _margin_ns: u64,
        _when_ns: u64,
    ) {
    }

    /// Records GPU start/end timestamps for `frame_id`, accumulating
    /// gpu/gpu_delay/total statistics.
    pub fn info_gpu(&mut self, frame_id: i64, gpu_start_ns: u64, gpu_end_ns: u64, _when_ns: u64) {
        let live_stats = self.live_stats;
        let Some(frame) = self.frame_mut(frame_id) else { return };
        frame.gpu_start_ns = gpu_start_ns;
        frame.gpu_end_ns = gpu_end_ns;

        if !live_stats {
            return;
        }

        let then_ns = frame.submit_began_ns;
        let delay_ns = gpu_start_ns.saturating_sub(then_ns);
        let gpu_ns = gpu_end_ns.saturating_sub(gpu_start_ns);
        let total_ns = gpu_end_ns.saturating_sub(frame.woke_ns);

        let mut full = false;
        full |= self.gpu.add(gpu_ns);
        full |= self.gpu_delay.add(delay_ns);
        full |= self.total.add(total_ns);
        if full {
            self.print_and_reset();
        }
    }

    /// Syncs the pacer's notion of "last present" to a vblank timestamp
    /// observed directly from the display engine.
    pub fn update_vblank(&mut self, last_vblank_ns: u64) {
        self.last_present_ns = last_vblank_ns;
    }

    /// Reconfigures the present-to-display offset at runtime, clamped the
    /// same way the startup default is.
    pub fn update_present_offset(&mut self, offset_ns: u64) {
        self.present_to_display_offset_ns = offset_ns.clamp(1_000_000, 40_000_000);
    }

    fn print_and_reset(&mut self) {
        let cpu = self.cpu.get_and_reset();
        let draw = self.draw.get_and_reset();
        let submit = self.submit.get_and_reset();
        let gpu = self.gpu.get_and_reset();
        let gpu_delay = self.gpu_delay.get_and_reset();
        let total = self.total.get_and_reset();

        log::info!(
            "Compositor frame timing: cpu {}ms draw {}ms submit {}ms gpu {}ms gpu_delay {}ms total {}ms (median)",
            cpu.median_ns as f64 / 1e6,
            draw.median_ns as f64 / 1e6,
            submit.median_ns as f64 / 1e6,
            gpu.median_ns as f64 / 1e6,
            gpu_delay.median_ns as f64 / 1e6,
            total.median_ns as f64 / 1e6,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer_at(now_ns: u64) -> FramePacer {
        FramePacer::new(11_111_111, now_ns, &CompositorConfig::default())
    }

    #[test]
    fn predict_allocates_monotonic_ids() {
        let mut pacer = pacer_at(0);
        let a = pacer.predict(0);
        let b = pacer.predict(0);
        assert_eq!(b.frame_id, a.frame_id + 1);
    }

    #[test]
    fn wake_up_precedes_desired_present_by_composition_budget() {
        let mut pacer = pacer_at(0);
        let prediction = pacer.predict(0);
        assert!(prediction.wake_up_ns < prediction.desired_present_ns);
    }

    #[test]
    fn predicted_display_is_present_plus_offset() {
        let mut pacer = pacer_at(0);
        let config = CompositorConfig::default();
        let prediction = pacer.predict(0);
        assert_eq!(
            prediction.predicted_display_ns,
            prediction.desired_present_ns + config.present_to_display_offset_ns
        );
    }

    #[test]
    fn mark_for_overrun_frame_is_dropped_not_panicking() {
        let mut pacer = pacer_at(0);
        // No predict() yet — frame_id 0's slot holds the default `Frame`
        // with id 0, so this would NOT be dropped; force an overrun by
        // advancing the generator past FRAME_COUNT first.
        for _ in 0..FRAME_COUNT {
            pacer.predict(0);
        }
        // Frame id 0's slot (index 0) now holds frame id FRAME_COUNT.
        pacer.mark_point(TimingPoint::WakeUp, 0, 123);
        // No panic, and the live slot is untouched.
    }

    #[test]
    fn frame_slot_is_addressed_by_id_mod_frame_count() {
        let mut pacer = pacer_at(0);
        let first = pacer.predict(1_000);
        pacer.mark_point(TimingPoint::WakeUp, first.frame_id, 2_000);
        assert_eq!(pacer.frame_mut(first.frame_id).unwrap().woke_ns, 2_000);
    }
}
