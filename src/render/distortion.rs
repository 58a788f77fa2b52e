//! Layer Squash / Distortion Dispatch
//!
//! The per-frame graphics or compute work that turns a [`LayerList`] plus
//! per-view distortion textures into pixels in the target image, either
//! by squashing layers into scratch images first (slow path) or sampling
//! the client's projection images directly (fast path). Modeled on
//! `render_gfx.c`/`render_compute.c` and `render_distortion.c`.

use glam::{Mat4, Vec2};
use wgpu::{CommandEncoder, Device, TextureView};

use crate::math::{calc_time_warp_matrix, Fov, Pose};
use crate::render::layer::{Layer, LayerList};
use crate::render::resources::{LayerKind as PipelineLayerKind, PipelineVariant, RenderResources};
use crate::render::scratch::ScratchImage;

/// Per-view inputs both dispatch paths need: where this view's layers
/// land in scratch space, and where the final distorted result lands in
/// the target.
pub struct ViewDispatchData<'a> {
    pub world_pose: Pose,
    pub eye_pose: Pose,
    pub fov: Fov,
    pub scratch_image: &'a ScratchImage,
    pub layer_viewport: (u32, u32, u32, u32),
    pub target_viewport: (u32, u32, u32, u32),
    /// Rotation applied to the distortion sample, baked in when the
    /// target surface requires a 90°/270° pre-rotation.
    pub target_pre_rotation_deg: u32,
}

/// Full per-frame dispatch input, shared by the graphics and compute
/// renderers.
pub struct DispatchData<'a> {
    pub views: Vec<ViewDispatchData<'a>>,
    pub target_view: &'a TextureView,
    pub fast_path: bool,
    pub do_timewarp: bool,
}

impl<'a> DispatchData<'a> {
    /// `true` when the fast path may skip layer squashing: caller has
    /// already confirmed `fast_path` and the layer list is a single
    /// undepthed stereo projection.
    #[must_use]
    pub fn takes_fast_path(&self, layers: &LayerList) -> bool {
        self.fast_path && layers.is_single_undepthed_projection()
    }
}

fn variant_for(layer: &Layer, do_timewarp: bool) -> PipelineVariant {
    let kind = match layer.kind {
        crate::render::layer::LayerKind::StereoProjection { .. } => PipelineLayerKind::Projection,
        crate::render::layer::LayerKind::Cylinder { .. } => PipelineLayerKind::Cylinder,
        crate::render::layer::LayerKind::Equirect2 { .. } => PipelineLayerKind::Equirect2,
        crate::render::layer::LayerKind::Quad { .. } => PipelineLayerKind::Quad,
        crate::render::layer::LayerKind::Cube { .. } => PipelineLayerKind::Cube,
    };
    PipelineVariant { kind, timewarp: do_timewarp, premultiplied_alpha: layer.is_premultiplied_alpha() }
}

/// Renders sub-pass A (layer squash) and sub-pass B (distortion) as two
/// graphics render passes, or the fast-path single distortion pass.
pub struct GraphicsLayerRenderer;

impl GraphicsLayerRenderer {
    /// Records the full frame into `encoder`. `distortion_pipeline_for`
    /// and `layer_pipeline_for` are supplied by the caller (which owns
    /// the mutable [`RenderResources`] cache) rather than borrowed here,
    /// so this type never needs to juggle overlapping mutable borrows of
    /// the resource cache across sub-passes.
    pub fn dispatch(
        &self,
        encoder: &mut CommandEncoder,
        dispatch: &DispatchData<'_>,
        layers: &LayerList,
        mut record_layer_pass: impl FnMut(&mut CommandEncoder, &ViewDispatchData<'_>, &[Layer]),
        mut record_distortion_pass: impl FnMut(&mut CommandEncoder, &ViewDispatchData<'_>, &TextureView, bool),
    ) {
        if dispatch.takes_fast_path(layers) {
            for view in &dispatch.views {
                record_distortion_pass(encoder, view, dispatch.target_view, dispatch.do_timewarp);
            }
            return;
        }

        for view in &dispatch.views {
            record_layer_pass(encoder, view, layers.as_slice());
        }
        for view in &dispatch.views {
            record_distortion_pass(encoder, view, dispatch.target_view, dispatch.do_timewarp);
        }
    }
}

/// Renders the same two sub-passes with compute shaders, inserting the
/// required layout-barrier sequence around each (the real
/// barrier recording happens in the caller's command encoder via
/// `record_barrier`; this type only sequences the calls).
pub struct ComputeLayerRenderer;

impl ComputeLayerRenderer {
    pub fn dispatch(
        &self,
        encoder: &mut CommandEncoder,
        dispatch: &DispatchData<'_>,
        layers: &LayerList,
        mut record_layer_squash_barrier_before: impl FnMut(&mut CommandEncoder),
        mut record_layer_squash: impl FnMut(&mut CommandEncoder, &ViewDispatchData<'_>, &[Layer]),
        mut record_layer_squash_barrier_after: impl FnMut(&mut CommandEncoder),
        mut record_distortion_barrier_before: impl FnMut(&mut CommandEncoder),
        mut record_distortion: impl FnMut(&mut CommandEncoder, &ViewDispatchData<'_>, bool),
        mut record_distortion_barrier_after: impl FnMut(&mut CommandEncoder),
    ) {
        if dispatch.takes_fast_path(layers) {
            record_distortion_barrier_before(encoder);
            for view in &dispatch.views {
                record_distortion(encoder, view, dispatch.do_timewarp);
            }
            record_distortion_barrier_after(encoder);
            return;
        }

        record_layer_squash_barrier_before(encoder);
        for view in &dispatch.views {
            record_layer_squash(encoder, view, layers.as_slice());
        }
        record_layer_squash_barrier_after(encoder);

        record_distortion_barrier_before(encoder);
        for view in &dispatch.views {
            record_distortion(encoder, view, dispatch.do_timewarp);
        }
        record_distortion_barrier_after(encoder);
    }
}

/// Picks (and lazily compiles) the pipeline a given layer must use for
/// this frame's squash sub-pass.
pub fn pipeline_for_layer<'r>(resources: &'r mut RenderResources, device: &Device, layout: &wgpu::PipelineLayout, source: &'static str, layer: &Layer, do_timewarp: bool) -> &'r wgpu::RenderPipeline {
    let variant = variant_for(layer, do_timewarp);
    resources.graphics_layer_pipeline(device, layout, source, variant)
}

/// Builds the distortion textures' UV sampling basis for one view,
/// folding in a 90°/270° surface pre-rotation when the target requires
/// it. Returns a 2x2 rotation applied to the tangent-plane UV before the
/// per-texel distortion lookup.
#[must_use]
pub fn distortion_uv_rotation(pre_rotation_deg: u32) -> Vec2 {
    match pre_rotation_deg % 360 {
        90 => Vec2::new(0.0, 1.0),
        180 => Vec2::new(-1.0, 0.0),
        270 => Vec2::new(0.0, -1.0),
        _ => Vec2::new(1.0, 0.0),
    }
}

/// Computes the per-view timewarp matrix to feed the distortion shader,
/// or the identity when timewarp is disabled for this frame. Takes the
/// pose/fov triple directly (rather than the whole [`ViewDispatchData`])
/// so callers don't need a scratch image in hand just to warp a matrix.
#[must_use]
pub fn timewarp_matrix_for(eye_pose: Pose, fov: Fov, world_pose: Pose, enabled: bool) -> Mat4 {
    if !enabled {
        return Mat4::IDENTITY;
    }
    calc_time_warp_matrix(&eye_pose, &fov, &world_pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrotated_distortion_uv_basis_is_identity_axis() {
        assert_eq!(distortion_uv_rotation(0), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn ninety_degree_rotation_swaps_axes() {
        assert_eq!(distortion_uv_rotation(90), Vec2::new(0.0, 1.0));
        assert_eq!(distortion_uv_rotation(450), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn timewarp_disabled_yields_identity() {
        let fov = Fov { angle_left: -0.5, angle_right: 0.5, angle_up: 0.5, angle_down: -0.5 };
        assert_eq!(timewarp_matrix_for(Pose::IDENTITY, fov, Pose::IDENTITY, false), Mat4::IDENTITY);
    }
}
