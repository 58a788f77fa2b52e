//! Scratch Images
//!
//! Rotating sets of mutable-format color images used as per-view
//! intermediate targets that layers are squashed into before the
//! distortion pass. Modeled on `comp_scratch_single_images` and
//! `comp_scratch_stereo_images`.

use wgpu::{Device, Extent3d, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor};

use crate::native_handle::{ExportedImageInfo, NativeImageHandle};
use crate::unique_id::{next_unique_id, UniqueId};

/// Number of images rotated through per scratch set.
pub const SCRATCH_IMAGE_COUNT: usize = 4;

/// The base format scratch images are created with; views are derived in
/// both SRGB (sampling) and UNORM (storage) flavors.
const SCRATCH_BASE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
const SCRATCH_SRGB_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// Exports a scratch (or swapchain) texture to a platform native handle.
///
/// Native export is inherently platform-specific (dmabuf fd on Linux,
/// `HANDLE` on Windows, `AHardwareBuffer` on Android) and sits below
/// `wgpu`'s portable surface; the compositor core depends only on this
/// seam, the same way it treats presentation backends as an external
/// collaborator (see the crate's scope notes).
pub trait NativeImageExporter: Send + Sync {
    /// Exports `texture`, returning the owned native handle plus the
    /// driver's memory requirements for it.
    fn export(&self, device: &Device, texture: &Texture) -> crate::errors::Result<(NativeImageHandle, ExportedImageInfo)>;
}

/// One scratch image: a single mutable-format color texture with both a
/// sampling (SRGB) and a storage (UNORM) view, plus its exported native
/// handle.
pub struct ScratchImage {
    pub texture: Texture,
    pub srgb_view: TextureView,
    pub unorm_view: TextureView,
    pub native_handle: NativeImageHandle,
    pub export_info: ExportedImageInfo,
}

fn create_scratch_image(device: &Device, extent: Extent3d, exporter: &dyn NativeImageExporter, label: &str) -> crate::errors::Result<ScratchImage> {
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: SCRATCH_BASE_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::STORAGE_BINDING | TextureUsages::COPY_SRC | TextureUsages::COPY_DST,
        view_formats: &[SCRATCH_SRGB_FORMAT],
    });

    let srgb_view = texture.create_view(&TextureViewDescriptor {
        label: Some("scratch_srgb_view"),
        format: Some(SCRATCH_SRGB_FORMAT),
        ..TextureViewDescriptor::default()
    });
    let unorm_view = texture.create_view(&TextureViewDescriptor {
        label: Some("scratch_unorm_view"),
        format: Some(SCRATCH_BASE_FORMAT),
        ..TextureViewDescriptor::default()
    });

    let (native_handle, export_info) = exporter.export(device, &texture)?;

    Ok(ScratchImage { texture, srgb_view, unorm_view, native_handle, export_info })
}

/// Round-robin cursor into a [`SCRATCH_IMAGE_COUNT`]-sized rotating set.
/// Mirrors `comp_scratch_indices`: `get` without an intervening `done`/
/// `discard` is a programmer error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScratchIndices {
    current: Option<u32>,
    last: Option<u32>,
}

impl ScratchIndices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the next index after `last` (wrapping), and marks it current.
    pub fn get(&mut self) -> u32 {
        assert!(self.current.is_none(), "scratch index acquired twice without done()/discard()");

        let next = match self.last {
            None => 0,
            Some(last) => (last + 1) % SCRATCH_IMAGE_COUNT as u32,
        };
        self.current = Some(next);
        next
    }

    /// Commits the current index as `last` and returns it.
    pub fn done(&mut self) -> u32 {
        let current = self.current.take().expect("done() without a matching get()");
        self.last = Some(current);
        current
    }

    /// Releases the current index without publishing it as `last`.
    pub fn discard(&mut self) {
        self.current.take().expect("discard() without a matching get()");
    }
}

/// A debug-UI snapshot published atomically after `done()`: a process
/// unique id, the last index, and the creation parameters. Native handles
/// are intentionally not duplicated here — debug consumers borrow the
/// owning set's images directly.
#[derive(Debug, Clone, Copy)]
pub struct ScratchDebugSnapshot {
    pub unique_id: UniqueId,
    pub last_index: u32,
    pub extent: Extent3d,
}

/// A single-view rotating set of scratch images (one set per eye/view).
pub struct SingleScratchImages {
    extent: Option<Extent3d>,
    images: Vec<ScratchImage>,
    indices: ScratchIndices,
    unique_id: UniqueId,
    debug: Option<ScratchDebugSnapshot>,
}

impl SingleScratchImages {
    #[must_use]
    pub fn new() -> Self {
        Self { extent: None, images: Vec::new(), indices: ScratchIndices::new(), unique_id: 0, debug: None }
    }

    /// Ensures the set has `SCRATCH_IMAGE_COUNT` images at `extent`,
    /// recreating all of them (and regenerating the unique id) if the
    /// extent differs from the current one. No-op if it already matches.
    pub fn ensure(&mut self, device: &Device, exporter: &dyn NativeImageExporter, extent: Extent3d) -> crate::errors::Result<()> {
        if self.extent == Some(extent) {
            return Ok(());
        }

        self.free();

        let mut images = Vec::with_capacity(SCRATCH_IMAGE_COUNT);
        for i in 0..SCRATCH_IMAGE_COUNT {
            images.push(create_scratch_image(device, extent, exporter, &format!("scratch_image[{i}]"))?);
        }

        self.images = images;
        self.extent = Some(extent);
        self.unique_id = next_unique_id();
        Ok(())
    }

    /// Picks the next round-robin index.
    pub fn get(&mut self) -> u32 {
        self.indices.get()
    }

    /// Commits the current index and publishes a debug snapshot.
    pub fn done(&mut self) {
        let last = self.indices.done();
        self.debug = Some(ScratchDebugSnapshot { unique_id: self.unique_id, last_index: last, extent: self.extent.expect("done() before ensure()") });
    }

    pub fn discard(&mut self) {
        self.indices.discard();
    }

    pub fn clear_debug(&mut self) {
        self.debug = None;
    }

    pub fn free(&mut self) {
        self.images.clear();
        self.extent = None;
        self.unique_id = 0;
        self.indices = ScratchIndices::new();
        self.debug = None;
    }

    #[must_use]
    pub fn image(&self, index: u32) -> &ScratchImage {
        &self.images[index as usize]
    }

    #[must_use]
    pub fn debug_snapshot(&self) -> Option<ScratchDebugSnapshot> {
        self.debug
    }
}

impl Default for SingleScratchImages {
    fn default() -> Self {
        Self::new()
    }
}

/// A stereo rotating set: two per-eye [`SingleScratchImages`] sets that
/// share one extent and one round-robin cursor.
pub struct StereoScratchImages {
    extent: Option<Extent3d>,
    views: [Vec<ScratchImage>; 2],
    indices: ScratchIndices,
    unique_id: UniqueId,
    debug: [Option<ScratchDebugSnapshot>; 2],
}

impl StereoScratchImages {
    #[must_use]
    pub fn new() -> Self {
        Self { extent: None, views: [Vec::new(), Vec::new()], indices: ScratchIndices::new(), unique_id: 0, debug: [None, None] }
    }

    pub fn ensure(&mut self, device: &Device, exporter: &dyn NativeImageExporter, extent: Extent3d) -> crate::errors::Result<()> {
        if self.extent == Some(extent) {
            return Ok(());
        }

        self.free();

        for view in 0..2 {
            let mut images = Vec::with_capacity(SCRATCH_IMAGE_COUNT);
            for i in 0..SCRATCH_IMAGE_COUNT {
                images.push(create_scratch_image(device, extent, exporter, &format!("scratch_stereo_image[{view}][{i}]"))?);
            }
            self.views[view] = images;
        }

        self.extent = Some(extent);
        self.unique_id = next_unique_id();
        Ok(())
    }

    pub fn get(&mut self) -> u32 {
        self.indices.get()
    }

    pub fn done(&mut self) {
        let last = self.indices.done();
        let extent = self.extent.expect("done() before ensure()");
        for view in 0..2 {
            self.debug[view] = Some(ScratchDebugSnapshot { unique_id: self.unique_id, last_index: last, extent });
        }
    }

    pub fn discard(&mut self) {
        self.indices.discard();
    }

    pub fn clear_debug(&mut self) {
        self.debug = [None, None];
    }

    pub fn free(&mut self) {
        self.views = [Vec::new(), Vec::new()];
        self.extent = None;
        self.unique_id = 0;
        self.indices = ScratchIndices::new();
        self.debug = [None, None];
    }

    #[must_use]
    pub fn image(&self, view: usize, index: u32) -> &ScratchImage {
        &self.views[view][index as usize]
    }
}

impl Default for StereoScratchImages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_round_robin_across_done_calls() {
        let mut indices = ScratchIndices::new();
        let mut seen = Vec::new();
        for _ in 0..SCRATCH_IMAGE_COUNT * 2 {
            let i = indices.get();
            seen.push(i);
            indices.done();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "acquired twice")]
    fn double_get_without_done_panics() {
        let mut indices = ScratchIndices::new();
        indices.get();
        indices.get();
    }

    #[test]
    fn discard_does_not_advance_last() {
        let mut indices = ScratchIndices::new();
        assert_eq!(indices.get(), 0);
        indices.done();
        assert_eq!(indices.get(), 1);
        indices.discard();
        assert_eq!(indices.get(), 1);
    }
}
