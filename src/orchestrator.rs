//! Per-Frame Orchestrator
//!
//! Drives one compositor frame end to end: predict, wake, acquire,
//! dispatch, present, and feed GPU timings back to the pacer. Owns the
//! pacer and target, and is driven from the single compositor thread.
//! Modeled on `comp_renderer`'s per-frame state machine.

use crate::config::CompositorConfig;
use crate::pacer::{FramePacer, TimingPoint};
use crate::render::layer::LayerList;
use crate::render::scratch::{SingleScratchImages, StereoScratchImages};
use crate::target::Target;

/// Warn once a frame's eager next-acquire blocks more than this long past
/// the desired present time (direct-mode drivers should never stall
/// here; a stall means the runtime is falling behind).
const LATE_ACQUIRE_WARN_NS: u64 = 1_000_000;

/// A frame's progress through the per-frame state machine, tracked so
/// the orchestrator can tell a caller what it actually did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was fully rendered and presented.
    Presented,
    /// The target wasn't ready; the frame was dropped with submit marks
    /// emulated so the pacer's timing model stays consistent.
    DroppedTargetNotReady,
}

/// Where scratch images for this frame came from: a single set (shared
/// between layers) or the stereo layout used when each eye is rendered
/// independently.
pub enum ScratchLayout {
    Single(SingleScratchImages),
    Stereo(StereoScratchImages),
}

/// Ties the pacer, a presentation target, and the scratch/layer pipeline
/// together into the frame loop described in the concurrency model: one
/// compositor thread owns all of this.
pub struct Orchestrator<T: Target> {
    pacer: FramePacer,
    target: T,
    acquired_image: Option<u32>,
    do_timewarp: bool,
}

impl<T: Target> Orchestrator<T> {
    #[must_use]
    pub fn new(target: T, frame_period_ns: u64, now_ns: u64, config: &CompositorConfig) -> Self {
        Self { pacer: FramePacer::new(frame_period_ns, now_ns, config), target, acquired_image: None, do_timewarp: true }
    }

    #[must_use]
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    #[must_use]
    pub fn pacer_mut(&mut self) -> &mut FramePacer {
        &mut self.pacer
    }

    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[must_use]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn set_timewarp_enabled(&mut self, enabled: bool) {
        self.do_timewarp = enabled;
    }

    #[must_use]
    pub fn timewarp_enabled(&self) -> bool {
        self.do_timewarp
    }

    /// Runs one frame:
    ///
    /// 1. Asks the pacer for a prediction.
    /// 2. At wake, marks `WakeUp` on the pacer and `Begin` on the target.
    /// 3. If the target isn't ready, emulates submit marks on both the
    ///    pacer and the target and drops the frame rather than blocking
    ///    forever on a window that may never come back.
    /// 4. Flushes and updates target timings.
    /// 5. Acquires an image if none is held, recreating on
    ///    out-of-date/suboptimal (the target itself retries once; see
    ///    [`crate::target::SurfaceTarget::acquire`]).
    /// 6. Runs `dispatch`, which the caller supplies — it owns the
    ///    scratch/layer/distortion pipeline and the actual command
    ///    recording, since that needs the `RenderResources` cache this
    ///    type deliberately doesn't own (resource caches outlive any
    ///    single orchestrator session).
    /// 7. Presents, marks submit begin/end on the pacer and target, waits
    ///    for queue idle, and reads GPU timestamps back into both the
    ///    pacer and the target.
    /// 8. Eagerly re-acquires the next image.
    pub fn run_frame(
        &mut self,
        layers: &LayerList,
        now_ns: impl Fn() -> u64,
        mut dispatch: impl FnMut(&mut T, u32, &LayerList, bool),
        gpu_timestamps: impl FnOnce(&mut T) -> Option<(u64, u64)>,
    ) -> crate::errors::Result<FrameOutcome> {
        let prediction = self.pacer.predict(now_ns());
        self.pacer.mark_point(TimingPoint::WakeUp, prediction.frame_id, now_ns());
        self.target.mark_begin(now_ns());

        if !self.target.check_ready() {
            self.pacer.mark_point(TimingPoint::SubmitBegin, prediction.frame_id, now_ns());
            self.target.mark_submit_begin(now_ns());
            self.pacer.mark_point(TimingPoint::SubmitEnd, prediction.frame_id, now_ns());
            self.target.mark_submit_end(now_ns());
            return Ok(FrameOutcome::DroppedTargetNotReady);
        }

        self.pacer.mark_point(TimingPoint::Begin, prediction.frame_id, now_ns());
        self.target.flush();
        let _ = self.target.update_timings();

        let index = match self.acquired_image.take() {
            Some(index) => index,
            None => self.target.acquire()?,
        };

        self.pacer.mark_point(TimingPoint::SubmitBegin, prediction.frame_id, now_ns());
        self.target.mark_submit_begin(now_ns());
        dispatch(&mut self.target, index, layers, self.do_timewarp);
        self.pacer.mark_point(TimingPoint::SubmitEnd, prediction.frame_id, now_ns());
        self.target.mark_submit_end(now_ns());

        self.target.present(index, prediction.desired_present_ns, prediction.present_slop_ns)?;

        self.target.flush();

        if let Some((gpu_start_ns, gpu_end_ns)) = gpu_timestamps(&mut self.target) {
            self.pacer.info_gpu(prediction.frame_id, gpu_start_ns, gpu_end_ns, now_ns());
            self.target.info_gpu(gpu_start_ns, gpu_end_ns);
        }

        let acquire_started_ns = now_ns();
        self.acquired_image = Some(self.target.acquire()?);
        let acquire_elapsed_ns = now_ns().saturating_sub(acquire_started_ns);
        if acquire_started_ns.saturating_sub(prediction.desired_present_ns) > LATE_ACQUIRE_WARN_NS || acquire_elapsed_ns > LATE_ACQUIRE_WARN_NS {
            log::warn!("eager next-acquire exceeded {LATE_ACQUIRE_WARN_NS}ns past the desired present time");
        }

        Ok(FrameOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{PresentTimings, SurfaceTransform};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeTarget {
        ready: bool,
        acquires: AtomicU32,
    }

    impl Target for FakeTarget {
        fn check_ready(&mut self) -> bool {
            self.ready
        }
        fn create_images(&mut self, _w: u32, _h: u32, _f: wgpu::TextureFormat, _pm: wgpu::PresentMode) -> crate::errors::Result<()> {
            Ok(())
        }
        fn has_images(&self) -> bool {
            true
        }
        fn image_count(&self) -> usize {
            1
        }
        fn view(&self, _index: usize) -> &wgpu::TextureView {
            unimplemented!("not exercised by the orchestrator unit tests")
        }
        fn acquire(&mut self) -> crate::errors::Result<u32> {
            Ok(self.acquires.fetch_add(1, Ordering::SeqCst))
        }
        fn present(&mut self, _index: u32, _desired_present_ns: u64, _slop_ns: u64) -> crate::errors::Result<()> {
            Ok(())
        }
        fn flush(&mut self) {}
        fn mark_begin(&mut self, _when_ns: u64) {}
        fn mark_submit_begin(&mut self, _when_ns: u64) {}
        fn mark_submit_end(&mut self, _when_ns: u64) {}
        fn info_gpu(&mut self, _gpu_start_ns: u64, _gpu_end_ns: u64) {}
        fn update_timings(&mut self) -> Option<PresentTimings> {
            None
        }
        fn surface_transform(&self) -> SurfaceTransform {
            SurfaceTransform::Identity
        }
    }

    #[test]
    fn not_ready_target_drops_frame_without_acquiring() {
        let target = FakeTarget { ready: false, acquires: AtomicU32::new(0) };
        let mut orchestrator = Orchestrator::new(target, 11_111_111, 0, &CompositorConfig::default());
        let layers = LayerList::new();

        let outcome = orchestrator.run_frame(&layers, || 0, |_, _, _, _| {}, |_| None);
        assert_eq!(outcome.unwrap(), FrameOutcome::DroppedTargetNotReady);
        assert_eq!(orchestrator.target().acquires.load(Ordering::SeqCst), 0);
    }
}
