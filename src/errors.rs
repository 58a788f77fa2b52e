//! Error Types
//!
//! This module defines the error types raised by the compositor core.
//!
//! All public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, CompositorError>`.

use thiserror::Error;

/// The error type for the compositor core.
///
/// Each variant corresponds to one of the error kinds the core is
/// specified to raise; see the kind-to-variant mapping in the crate's
/// design notes. `out-of-date` and `suboptimal` surface states are
/// intentionally *not* variants here — they are handled locally by the
/// orchestrator (rebuild + retry) and never escape to a caller.
#[derive(Error, Debug)]
pub enum CompositorError {
    /// FIFO was empty on `acquire`, or full on `release`.
    #[error("no image available")]
    NoImageAvailable,

    /// `wait_image` exceeded its deadline. Distinct from a GPU error so
    /// callers can distinguish "still busy" from "broken".
    #[error("wait_image timed out")]
    Timeout,

    /// Any GPU-layer failure. Carries the calling function and source
    /// location so the resulting log line can point at exactly where the
    /// failure originated, mirroring the source's `VK_ERROR` macro.
    #[error("gpu error in {function} at {file}:{line}: {message}")]
    GpuError {
        /// Human-readable failure description.
        message: String,
        /// Name of the function that detected the failure.
        function: &'static str,
        /// Source file of the call site.
        file: &'static str,
        /// Source line of the call site.
        line: u32,
    },

    /// Swapchain creation failed because the driver reported an
    /// unsupported format or missing feature. Distinct from a generic
    /// `GpuError` because it is usually recoverable by falling back to a
    /// different format.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Attempted to create a native compositor on a system that has
    /// none.
    #[error("compositor not supported")]
    CompositorNotSupported,

    /// Failed to request a compatible GPU adapter.
    #[error("failed to request adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("failed to create device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Window/surface handle error.
    #[error("window handle error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),
}

/// Builds a [`CompositorError::GpuError`] tagged with the call site,
/// mirroring the source's `VK_ERROR(vk, "...")` macro.
macro_rules! gpu_error {
    ($function:expr, $($arg:tt)*) => {
        $crate::errors::CompositorError::GpuError {
            message: format!($($arg)*),
            function: $function,
            file: file!(),
            line: line!(),
        }
    };
}
pub(crate) use gpu_error;

/// Alias for `Result<T, CompositorError>`.
pub type Result<T> = std::result::Result<T, CompositorError>;
