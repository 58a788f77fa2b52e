//! Submitted Layers
//!
//! The application-facing description of one compositor layer: a tagged
//! union over the supported shapes, the swapchain(s) it samples, and the
//! flags controlling how it's blended and placed. Modeled on
//! `xrt_layer_data` and the per-kind structs in `xrt_compositor.h`.

use glam::Vec3;

use crate::math::Pose;
use crate::unique_id::UniqueId;

/// Upper bound on layers squashed together in one composited frame.
pub const MAX_LAYERS: usize = 16;

bitflags::bitflags! {
    /// Per-layer blend/placement flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerFlags: u32 {
        /// Flip the sampled v coordinate before use.
        const FLIP_Y = 1 << 0;
        /// Source alpha is not premultiplied; the renderer must pick the
        /// unpremultiplied blend pipeline variant.
        const UNPREMULTIPLIED_ALPHA = 1 << 1;
        /// The layer's pose is relative to the view rather than world
        /// space.
        const VIEW_SPACE = 1 << 2;
        /// Blend using the source texture's alpha channel rather than a
        /// layer-wide opacity.
        const BLEND_TEXTURE_SOURCE_ALPHA = 1 << 3;
        /// Only one eye should see this layer (left when unset, right
        /// when set — paired with [`LayerFlags::EYE_VISIBILITY_BOTH`]).
        const EYE_VISIBILITY_RIGHT_ONLY = 1 << 4;
        const EYE_VISIBILITY_LEFT_ONLY = 1 << 5;
    }
}

/// Which array slice and normalized rect of a swapchain image a view
/// samples from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubImage {
    pub image_index: u32,
    pub array_slice: u32,
    pub rect: crate::math::NormalizedRect,
}

/// A reference to an application swapchain plus the sub-image inside it
/// a given view samples. Layers carry one per view (stereo) or one
/// shared across views (mono).
#[derive(Debug, Clone, Copy)]
pub struct LayerView {
    pub swapchain_id: UniqueId,
    pub sub_image: SubImage,
    pub pose: Pose,
    pub fov: crate::math::Fov,
}

/// Cylinder-shape intrinsic parameters. A radius of `0.0` or
/// [`f32::INFINITY`] degenerates to a unit sphere centered on the eye
/// (rotation only, no parallax).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderData {
    pub radius: f32,
    pub central_angle: f32,
    pub aspect_ratio: f32,
}

impl CylinderData {
    #[must_use]
    pub fn is_degenerate_sphere(&self) -> bool {
        self.radius == 0.0 || self.radius.is_infinite()
    }
}

/// Equirect2-shape intrinsic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equirect2Data {
    pub radius: f32,
    pub central_horizontal_angle: f32,
    pub upper_vertical_angle: f32,
    pub lower_vertical_angle: f32,
}

/// Quad-shape intrinsic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadData {
    pub size: glam::Vec2,
}

/// Cube-shape intrinsic parameters. Cube layers require
/// `RenderResources::supports_cube_layers()`; submitting one on a device
/// without cube-array sampling support is a caller error.
#[derive(Debug, Clone, Copy)]
pub struct CubeData {
    pub swapchain_id: UniqueId,
}

/// The tagged union of layer shapes a frame may composite.
#[derive(Debug, Clone)]
pub enum LayerKind {
    /// Two eye views (and optionally a depth sub-image per view) sampled
    /// with a per-view projection and UV-to-tangent transform.
    StereoProjection { views: [LayerView; 2], depth: Option<[SubImage; 2]> },
    Cylinder { views: [LayerView; 2], data: CylinderData },
    Equirect2 { views: [LayerView; 2], data: Equirect2Data },
    Quad { view: LayerView, data: QuadData },
    Cube { pose: Pose, data: CubeData },
}

/// One submitted layer: a shape plus its blend/placement flags, in the
/// order the application wants them composited (back to front).
#[derive(Debug, Clone)]
pub struct Layer {
    pub kind: LayerKind,
    pub flags: LayerFlags,
    pub position: Vec3,
}

impl Layer {
    /// `true` for premultiplied-alpha blending: unset
    /// [`LayerFlags::UNPREMULTIPLIED_ALPHA`] is the premultiplied case.
    #[must_use]
    pub fn is_premultiplied_alpha(&self) -> bool {
        !self.flags.contains(LayerFlags::UNPREMULTIPLIED_ALPHA)
    }

    /// The source/destination blend factors this layer's pipeline must
    /// use, per the premultiplied/unpremultiplied split: source is `1`
    /// for premultiplied and `SRC_ALPHA` otherwise; destination is always
    /// `1 - SRC_ALPHA` for color and `1` for alpha.
    #[must_use]
    pub fn blend_state(&self) -> wgpu::BlendState {
        let src_factor = if self.is_premultiplied_alpha() { wgpu::BlendFactor::One } else { wgpu::BlendFactor::SrcAlpha };
        wgpu::BlendState {
            color: wgpu::BlendComponent { src_factor, dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha, operation: wgpu::BlendOperation::Add },
            alpha: wgpu::BlendComponent { src_factor: wgpu::BlendFactor::One, dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha, operation: wgpu::BlendOperation::Add },
        }
    }
}

/// The per-frame bounded set of layers to squash, in submission order.
/// Mirrors the source's fixed `RENDER_MAX_LAYERS`-sized array.
#[derive(Debug, Clone, Default)]
pub struct LayerList {
    layers: smallvec::SmallVec<[Layer; MAX_LAYERS]>,
}

impl LayerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `layer`. Returns `false` (and drops the layer) if the list
    /// is already at [`MAX_LAYERS`].
    #[must_use]
    pub fn push(&mut self, layer: Layer) -> bool {
        if self.layers.len() >= MAX_LAYERS {
            return false;
        }
        self.layers.push(layer);
        true
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// `true` when the fast path applies: exactly one layer, and it's an
    /// undepthed stereo projection.
    #[must_use]
    pub fn is_single_undepthed_projection(&self) -> bool {
        matches!(self.layers.as_slice(), [Layer { kind: LayerKind::StereoProjection { depth: None, .. }, .. }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_layer(flags: LayerFlags) -> Layer {
        let view = LayerView {
            swapchain_id: 1,
            sub_image: SubImage { image_index: 0, array_slice: 0, rect: crate::math::NormalizedRect { x: 0.0, y: 0.0, w: 1.0, h: 1.0 } },
            pose: Pose::IDENTITY,
            fov: crate::math::Fov { angle_left: -0.7, angle_right: 0.7, angle_up: 0.7, angle_down: -0.7 },
        };
        Layer { kind: LayerKind::StereoProjection { views: [view, view], depth: None }, flags, position: Vec3::ZERO }
    }

    #[test]
    fn premultiplied_is_the_default() {
        let layer = stereo_layer(LayerFlags::empty());
        assert!(layer.is_premultiplied_alpha());
    }

    #[test]
    fn unpremultiplied_flag_selects_src_alpha_blend_factor() {
        let layer = stereo_layer(LayerFlags::UNPREMULTIPLIED_ALPHA);
        assert!(!layer.is_premultiplied_alpha());
        assert_eq!(layer.blend_state().color.src_factor, wgpu::BlendFactor::SrcAlpha);
    }

    #[test]
    fn single_undepthed_projection_takes_fast_path() {
        let mut list = LayerList::new();
        list.push(stereo_layer(LayerFlags::empty()));
        assert!(list.is_single_undepthed_projection());
    }

    #[test]
    fn additional_layer_breaks_fast_path() {
        let mut list = LayerList::new();
        list.push(stereo_layer(LayerFlags::empty()));
        list.push(stereo_layer(LayerFlags::empty()));
        assert!(!list.is_single_undepthed_projection());
    }

    #[test]
    fn push_rejects_past_max_layers() {
        let mut list = LayerList::new();
        for _ in 0..MAX_LAYERS {
            assert!(list.push(stereo_layer(LayerFlags::empty())));
        }
        assert!(!list.push(stereo_layer(LayerFlags::empty())));
        assert_eq!(list.len(), MAX_LAYERS);
    }

    #[test]
    fn zero_radius_cylinder_is_degenerate_sphere() {
        let data = CylinderData { radius: 0.0, central_angle: 1.0, aspect_ratio: 1.0 };
        assert!(data.is_degenerate_sphere());
        let data = CylinderData { radius: f32::INFINITY, central_angle: 1.0, aspect_ratio: 1.0 };
        assert!(data.is_degenerate_sphere());
        let data = CylinderData { radius: 2.0, central_angle: 1.0, aspect_ratio: 1.0 };
        assert!(!data.is_degenerate_sphere());
    }
}
