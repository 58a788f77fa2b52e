//! Presentation Target
//!
//! Abstracts over "the thing the orchestrator presents into" so the
//! per-frame state machine in [`crate::orchestrator`] doesn't need to
//! know whether it's driving a windowed surface, a direct-mode display,
//! or a headless test double. Modeled on `comp_target` and generalized
//! from the engine's `WgpuContext`.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::{Device, Queue, Surface, SurfaceConfiguration, TextureFormat, TextureView};

use crate::errors::{gpu_error, CompositorError, Result};

/// Rotation the presentation engine applies between the compositor's
/// render target and the physical display, expressed in degrees
/// clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceTransform {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Per-present timing feedback a target may report back to the pacer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentTimings {
    pub desired_present_ns: u64,
    pub actual_present_ns: u64,
    pub earliest_present_ns: u64,
    pub margin_ns: u64,
}

/// What the orchestrator needs from a presentation backend each frame.
/// Implementations own the swapchain-of-one presented to the display (as
/// opposed to [`crate::render::swapchain::Swapchain`], which is the
/// application-facing multi-image swapchain).
pub trait Target: Send {
    /// Returns `true` once the target has usable images. A target starts
    /// unready (e.g. a minimized window) and the orchestrator must skip
    /// frames until it reports ready.
    fn check_ready(&mut self) -> bool;

    /// (Re)creates the target's images at the given parameters.
    fn create_images(&mut self, width: u32, height: u32, format: TextureFormat, present_mode: wgpu::PresentMode) -> Result<()>;

    fn has_images(&self) -> bool;

    fn image_count(&self) -> usize;

    fn view(&self, index: usize) -> &TextureView;

    /// Acquires the next presentable image index.
    fn acquire(&mut self) -> Result<u32>;

    /// Presents image `index`. `desired_present_ns`/`slop_ns` let a
    /// direct-mode backend schedule the flip precisely; a simple
    /// windowed backend may ignore them. Implementations own whatever
    /// submission queue they need internally rather than taking one as a
    /// parameter, since every `Target` is created with its own device and
    /// queue already in hand.
    fn present(&mut self, index: u32, desired_present_ns: u64, slop_ns: u64) -> Result<()>;

    /// Blocks until any backend-side submission queue is idle.
    fn flush(&mut self);

    fn mark_begin(&mut self, when_ns: u64);
    fn mark_submit_begin(&mut self, when_ns: u64);
    fn mark_submit_end(&mut self, when_ns: u64);

    fn info_gpu(&mut self, gpu_start_ns: u64, gpu_end_ns: u64);

    /// Publishes the latest [`PresentTimings`] this target has observed.
    fn update_timings(&mut self) -> Option<PresentTimings>;

    fn surface_transform(&self) -> SurfaceTransform;
}

/// A `wgpu`-backed windowed presentation target, generalizing the
/// common `WgpuContext` shape (device/queue/surface/config bundle) to the
/// [`Target`] trait's acquire/present/recreate contract, including the
/// OUT_OF_DATE/SUBOPTIMAL recreate-and-retry-once policy.
pub struct SurfaceTarget {
    device: Device,
    queue: Queue,
    surface: Surface<'static>,
    config: Option<SurfaceConfiguration>,
    current: Option<(wgpu::SurfaceTexture, TextureView)>,
    surface_transform: SurfaceTransform,
    last_timings: Option<PresentTimings>,
}

impl SurfaceTarget {
    /// Creates a target presenting to `window`, requesting a
    /// high-performance adapter compatible with it.
    pub async fn new<W>(window: Arc<W>) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window).map_err(|e| gpu_error!("wgpu::Instance::create_surface", "{e}"))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions { power_preference: wgpu::PowerPreference::HighPerformance, compatible_surface: Some(&surface), force_fallback_adapter: false })
            .await
            .map_err(|e| CompositorError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("compositor device"),
                required_features: wgpu::Features::TIMESTAMP_QUERY,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self { device, queue, surface, config: None, current: None, surface_transform: SurfaceTransform::Identity, last_timings: None })
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn recreate_surface(&mut self) {
        if let Some(config) = &self.config {
            self.surface.configure(&self.device, config);
        }
    }
}

impl Target for SurfaceTarget {
    fn check_ready(&mut self) -> bool {
        self.config.is_some_and(|c| c.width > 0 && c.height > 0)
    }

    fn create_images(&mut self, width: u32, height: u32, format: TextureFormat, present_mode: wgpu::PresentMode) -> Result<()> {
        if width == 0 || height == 0 {
            self.config = None;
            return Ok(());
        }

        let config = SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        self.surface.configure(&self.device, &config);
        self.config = Some(config);
        self.current = None;
        Ok(())
    }

    fn has_images(&self) -> bool {
        self.config.is_some()
    }

    fn image_count(&self) -> usize {
        1
    }

    fn view(&self, _index: usize) -> &TextureView {
        &self.current.as_ref().expect("view() called before a successful acquire()").1
    }

    fn acquire(&mut self) -> Result<u32> {
        let attempt = self.surface.get_current_texture();

        let texture = match attempt {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.recreate_surface();
                self.device.poll(wgpu::PollType::Wait).map_err(|e| CompositorError::GpuError {
                    message: e.to_string(),
                    function: "wgpu::Device::poll",
                    file: file!(),
                    line: line!(),
                })?;
                self.surface.get_current_texture().map_err(|e| CompositorError::GpuError {
                    message: e.to_string(),
                    function: "wgpu::Surface::get_current_texture (retry)",
                    file: file!(),
                    line: line!(),
                })?
            }
            Err(e) => {
                return Err(CompositorError::GpuError { message: e.to_string(), function: "wgpu::Surface::get_current_texture", file: file!(), line: line!() });
            }
        };

        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.current = Some((texture, view));
        Ok(0)
    }

    fn present(&mut self, _index: u32, desired_present_ns: u64, _slop_ns: u64) -> Result<()> {
        let Some((texture, _)) = self.current.take() else {
            return Err(CompositorError::NoImageAvailable);
        };
        texture.present();
        self.last_timings = Some(PresentTimings { desired_present_ns, actual_present_ns: desired_present_ns, earliest_present_ns: desired_present_ns, margin_ns: 0 });
        Ok(())
    }

    fn flush(&mut self) {
        let _ = self.device.poll(wgpu::PollType::Wait);
    }

    fn mark_begin(&mut self, _when_ns: u64) {}
    fn mark_submit_begin(&mut self, _when_ns: u64) {}
    fn mark_submit_end(&mut self, _when_ns: u64) {}

    fn info_gpu(&mut self, _gpu_start_ns: u64, _gpu_end_ns: u64) {}

    fn update_timings(&mut self) -> Option<PresentTimings> {
        self.last_timings.take()
    }

    fn surface_transform(&self) -> SurfaceTransform {
        self.surface_transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_transform_defaults_to_identity() {
        assert_eq!(SurfaceTransform::default(), SurfaceTransform::Identity);
    }
}
