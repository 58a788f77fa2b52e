//! GPU-side rendering: scratch images, swapchains, the sub-allocator,
//! the resource cache, submitted layers, and the distortion dispatch.

pub mod distortion;
pub mod layer;
pub mod resources;
pub mod scratch;
pub mod sub_alloc;
pub mod swapchain;
