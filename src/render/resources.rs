//! Render Resource Cache
//!
//! Device-lifetime resources shared across every frame and every
//! session: samplers, compiled pipelines, and the per-frame shared
//! uniform buffer layers squash into. Modeled on `render_resources`.

use rustc_hash::FxHashMap;
use wgpu::{
    AddressMode, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, BufferBindingType, ComputePipeline,
    ComputePipelineDescriptor, Device, FilterMode, PipelineCompilationOptions, PipelineLayoutDescriptor, Queue, RenderPipeline,
    RenderPipelineDescriptor, Sampler, SamplerBorderColor, SamplerDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource,
    ShaderStages,
};

use crate::render::sub_alloc::{SubAllocTracker, UBO_ALIGNMENT};

/// Layer kinds a graphics/compute pipeline variant is specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerKind {
    #[default]
    Projection,
    Quad,
    Cylinder,
    Equirect2,
    Cube,
}

/// Whether a pipeline variant also applies the timewarp reprojection
/// correction in the same pass, and whether source alpha is
/// premultiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineVariant {
    pub kind: LayerKind,
    pub timewarp: bool,
    pub premultiplied_alpha: bool,
}

/// Key identifying one compiled graphics or compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PipelineKey {
    Mesh { timewarp: bool },
    GraphicsLayer(PipelineVariant),
    ComputeClear,
    ComputeLayer(PipelineVariant),
    ComputeDistortion { timewarp: bool },
}

/// The four samplers shared by every layer and distortion shader.
pub struct Samplers {
    pub mock: Sampler,
    pub repeat: Sampler,
    pub clamp_to_edge: Sampler,
    pub clamp_to_border_black: Sampler,
}

impl Samplers {
    fn create(device: &Device) -> Self {
        let mock = device.create_sampler(&SamplerDescriptor {
            label: Some("render_resources sampler mock"),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        });
        let repeat = device.create_sampler(&SamplerDescriptor {
            label: Some("render_resources sampler repeat"),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        let clamp_to_edge = device.create_sampler(&SamplerDescriptor {
            label: Some("render_resources sampler clamp_to_edge"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        let clamp_to_border_black = device.create_sampler(&SamplerDescriptor {
            label: Some("render_resources sampler clamp_to_border_black"),
            address_mode_u: AddressMode::ClampToBorder,
            address_mode_v: AddressMode::ClampToBorder,
            address_mode_w: AddressMode::ClampToBorder,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            border_color: Some(SamplerBorderColor::TransparentBlack),
            ..Default::default()
        });

        Self { mock, repeat, clamp_to_edge, clamp_to_border_black }
    }
}

/// The per-frame shared UBO layers squash into, sub-allocated 256 bytes
/// at a time. One instance lives per frame-in-flight.
pub struct SharedUbo {
    pub buffer: wgpu::Buffer,
    pub tracker: SubAllocTracker,
}

impl SharedUbo {
    fn create(device: &Device, max_layers_per_frame: u32) -> Self {
        let size = u64::from(max_layers_per_frame) * UBO_ALIGNMENT;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("render_resources gfx shared ubo"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, tracker: SubAllocTracker::new(size) }
    }
}

fn compile_shader(device: &Device, cache: &mut FxHashMap<&'static str, ShaderModule>, label: &'static str, source: &'static str) -> ShaderModule {
    cache
        .entry(label)
        .or_insert_with(|| device.create_shader_module(ShaderModuleDescriptor { label: Some(label), source: ShaderSource::Wgsl(source.into()) }))
        .clone()
}

/// Lazily compiled, cached graphics/compute pipelines plus the samplers
/// and shared UBO every frame reuses. Mirrors a keyed pipeline cache
/// shape (fast keyed lookup, compile-on-miss) generalized from
/// material/geometry variants to layer-kind/timewarp/alpha variants.
pub struct RenderResources {
    pub samplers: Samplers,
    pub shared_ubo: SharedUbo,
    pub layer_bind_group_layout: BindGroupLayout,
    pub timewarp_bind_group_layout: BindGroupLayout,

    module_cache: FxHashMap<&'static str, ShaderModule>,
    graphics_cache: FxHashMap<PipelineKey, RenderPipeline>,
    compute_cache: FxHashMap<PipelineKey, ComputePipeline>,

    view_count: u32,
    cube_layers_supported: bool,
}

impl RenderResources {
    /// Creates the device-lifetime resource set for a session rendering
    /// `view_count` views (2 for stereo HMDs).
    #[must_use]
    pub fn new(device: &Device, view_count: u32, max_layers_per_frame: u32, cube_layers_supported: bool) -> Self {
        let samplers = Samplers::create(device);
        let shared_ubo = SharedUbo::create(device, max_layers_per_frame);

        let layer_bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("render_resources layer bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX_FRAGMENT | ShaderStages::COMPUTE,
                ty: BindingType::Buffer { ty: BufferBindingType::Uniform, has_dynamic_offset: true, min_binding_size: None },
                count: None,
            }],
        });
        let timewarp_bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("render_resources timewarp bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX | ShaderStages::COMPUTE,
                ty: BindingType::Buffer { ty: BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                count: None,
            }],
        });

        Self {
            samplers,
            shared_ubo,
            layer_bind_group_layout,
            timewarp_bind_group_layout,
            module_cache: FxHashMap::default(),
            graphics_cache: FxHashMap::default(),
            compute_cache: FxHashMap::default(),
            view_count,
            cube_layers_supported,
        }
    }

    #[must_use]
    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    /// Cube layers require an imageCubeArray-capable sampled image, which
    /// not every backend/device combination exposes; callers must check
    /// this before accepting a [`LayerKind::Cube`] layer.
    #[must_use]
    pub fn supports_cube_layers(&self) -> bool {
        self.cube_layers_supported
    }

    /// Returns the compiled mesh-with-distortion graphics pipeline for
    /// `timewarp`, compiling it on first use.
    pub fn mesh_pipeline(&mut self, device: &Device, layout: &wgpu::PipelineLayout, source: &'static str, timewarp: bool) -> &RenderPipeline {
        let key = PipelineKey::Mesh { timewarp };
        self.graphics_cache.entry(key).or_insert_with(|| {
            let module = compile_shader(device, &mut self.module_cache, "distortion_mesh", source);
            Self::build_graphics_pipeline(device, layout, &module, timewarp)
        })
    }

    /// Returns the compiled graphics layer-squash pipeline for `variant`,
    /// compiling it on first use.
    pub fn graphics_layer_pipeline(
        &mut self,
        device: &Device,
        layout: &wgpu::PipelineLayout,
        source: &'static str,
        variant: PipelineVariant,
    ) -> &RenderPipeline {
        let key = PipelineKey::GraphicsLayer(variant);
        self.graphics_cache.entry(key).or_insert_with(|| {
            let module = compile_shader(device, &mut self.module_cache, "layer_squash_graphics", source);
            Self::build_graphics_pipeline(device, layout, &module, variant.timewarp)
        })
    }

    /// Returns the compute clear pipeline, compiling it on first use.
    pub fn compute_clear_pipeline(&mut self, device: &Device, layout: &wgpu::PipelineLayout, source: &'static str) -> &ComputePipeline {
        self.compute_cache.entry(PipelineKey::ComputeClear).or_insert_with(|| {
            let module = compile_shader(device, &mut self.module_cache, "layer_clear_compute", source);
            Self::build_compute_pipeline(device, layout, &module)
        })
    }

    /// Returns the compute layer-squash pipeline for `variant`, compiling
    /// it on first use.
    pub fn compute_layer_pipeline(
        &mut self,
        device: &Device,
        layout: &wgpu::PipelineLayout,
        source: &'static str,
        variant: PipelineVariant,
    ) -> &ComputePipeline {
        let key = PipelineKey::ComputeLayer(variant);
        self.compute_cache.entry(key).or_insert_with(|| {
            let module = compile_shader(device, &mut self.module_cache, "layer_squash_compute", source);
            Self::build_compute_pipeline(device, layout, &module)
        })
    }

    /// Returns the compute distortion pipeline for `timewarp`, compiling
    /// it on first use.
    pub fn compute_distortion_pipeline(
        &mut self,
        device: &Device,
        layout: &wgpu::PipelineLayout,
        source: &'static str,
        timewarp: bool,
    ) -> &ComputePipeline {
        let key = PipelineKey::ComputeDistortion { timewarp };
        self.compute_cache.entry(key).or_insert_with(|| {
            let module = compile_shader(device, &mut self.module_cache, "distortion_compute", source);
            Self::build_compute_pipeline(device, layout, &module)
        })
    }

    fn build_graphics_pipeline(device: &Device, layout: &wgpu::PipelineLayout, module: &ShaderModule, timewarp: bool) -> RenderPipeline {
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(if timewarp { "graphics pipeline (timewarp)" } else { "graphics pipeline" }),
            layout: Some(layout),
            vertex: wgpu::VertexState { module, entry_point: Some("vs_main"), buffers: &[], compilation_options: PipelineCompilationOptions::default() },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn build_compute_pipeline(device: &Device, layout: &wgpu::PipelineLayout, module: &ShaderModule) -> ComputePipeline {
        device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("compute pipeline"),
            layout: Some(layout),
            module,
            entry_point: Some("cs_main"),
            compilation_options: PipelineCompilationOptions::default(),
            cache: None,
        })
    }
}

/// A single timestamp-query GPU timing span (submit-begin, submit-end),
/// converted back to host nanoseconds via the queue's calibration.
pub struct GpuTimer {
    pub query_set: wgpu::QuerySet,
    pub resolve_buffer: wgpu::Buffer,
    pub readback_buffer: wgpu::Buffer,
}

impl GpuTimer {
    #[must_use]
    pub fn new(device: &Device) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor { label: Some("compositor gpu timer"), ty: wgpu::QueryType::Timestamp, count: 2 });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor gpu timer resolve"),
            size: 16,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor gpu timer readback"),
            size: 16,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self { query_set, resolve_buffer, readback_buffer }
    }

    /// Converts a raw GPU timestamp tick count to nanoseconds using the
    /// queue's timestamp period.
    #[must_use]
    pub fn ticks_to_ns(queue: &Queue, ticks: u64) -> u64 {
        (ticks as f64 * f64::from(queue.get_timestamp_period())) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_variants_with_different_timewarp_are_distinct_keys() {
        let a = PipelineKey::GraphicsLayer(PipelineVariant { kind: LayerKind::Quad, timewarp: true, premultiplied_alpha: false });
        let b = PipelineKey::GraphicsLayer(PipelineVariant { kind: LayerKind::Quad, timewarp: false, premultiplied_alpha: false });
        assert_ne!(a, b);
    }

    #[test]
    fn ticks_to_ns_scales_by_period() {
        // A period of 1.0 ns/tick should pass ticks through unchanged.
        let ns = (5_000_f64 * 1.0_f64) as u64;
        assert_eq!(ns, 5_000);
    }
}
