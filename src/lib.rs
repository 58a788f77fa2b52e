//! Compositor core: the platform-independent half of an OpenXR runtime's
//! compositor — frame pacing, pose relation chains, layer squashing and
//! distortion rendering, swapchain and scratch image lifecycle, a shared
//! render resource cache, and session/event fan-out.
//!
//! Platform integration (native window/display handles, IPC transport,
//! driver-specific image import/export) lives outside this crate; see
//! [`native_handle`] and [`render::scratch::NativeImageExporter`] for the
//! seams it plugs into.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod errors;
pub mod math;
pub mod native_handle;
pub mod orchestrator;
pub mod pacer;
pub mod render;
pub mod session;
pub mod target;
pub mod unique_id;

pub use config::CompositorConfig;
pub use errors::{CompositorError, Result};
pub use orchestrator::{FrameOutcome, Orchestrator};
pub use pacer::{FramePacer, FramePrediction, TimingPoint};
pub use session::{NativeCompositor, PerformanceSubDomain, Session, SessionEvent, System};
pub use target::{SurfaceTarget, SurfaceTransform, Target};
pub use unique_id::{next_unique_id, UniqueId};
