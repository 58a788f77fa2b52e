//! Native Handle Types
//!
//! Swapchain and distortion images, fences, and semaphores are exported
//! to the host platform as native OS handles. These are modeled as
//! move-only resource wrappers so that transfer semantics (import-by-move
//! vs. import-by-reference) are expressed by the type system rather than
//! by convention, the same way `raw-window-handle` wraps a platform
//! window handle without letting it be copied around carelessly.
//!
//! No handle is ever closed by this crate on a platform it does not own:
//! each wrapper's `Drop` impl releases the underlying OS resource, and a
//! handle that has been exported via [`NativeImageHandle::into_raw`] is
//! consumed and no longer runs that `Drop`.

use std::fmt;

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// Memory requirements that travel alongside an exported image handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedImageInfo {
    /// Size in bytes of the backing allocation, as reported by the GPU
    /// driver's memory requirements query.
    pub size: u64,
    /// Whether the driver requires a dedicated allocation for this
    /// image (cannot be suballocated).
    pub use_dedicated_allocation: bool,
}

/// A move-only native image handle, platform-specific.
///
/// On Linux this wraps a `dmabuf`/DRM file descriptor; on Windows a
/// shareable `HANDLE`; on Android an `AHardwareBuffer` pointer. Only one
/// variant is ever constructible for a given build target.
pub enum NativeImageHandle {
    /// POSIX file descriptor (Linux, and other unix targets that share
    /// the dmabuf export path).
    #[cfg(unix)]
    Fd(OwnedFd),
    /// Win32 `HANDLE`, carried as an opaque pointer-sized integer since
    /// `windows-sys` is out of scope for this crate.
    #[cfg(windows)]
    Win32Handle(RawWin32Handle),
    /// `AHardwareBuffer*`, carried as an opaque pointer-sized integer.
    #[cfg(target_os = "android")]
    HardwareBuffer(RawHardwareBuffer),
}

#[cfg(windows)]
#[derive(Debug)]
pub struct RawWin32Handle(pub isize);

#[cfg(target_os = "android")]
#[derive(Debug)]
pub struct RawHardwareBuffer(pub *mut std::ffi::c_void);

impl NativeImageHandle {
    /// Wraps a raw Linux/unix file descriptor, taking ownership of it.
    #[cfg(unix)]
    #[must_use]
    pub fn from_raw_fd(fd: RawFd) -> Self {
        // SAFETY: caller transfers ownership of a live fd to this wrapper.
        NativeImageHandle::Fd(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Consumes the handle and returns the raw file descriptor, giving up
    /// ownership to the caller. The caller is now responsible for closing
    /// it.
    #[cfg(unix)]
    #[must_use]
    pub fn into_raw_fd(self) -> RawFd {
        match self {
            NativeImageHandle::Fd(fd) => fd.into_raw_fd(),
        }
    }

    /// Borrows the raw file descriptor without transferring ownership.
    #[cfg(unix)]
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        match self {
            NativeImageHandle::Fd(fd) => fd.as_raw_fd(),
        }
    }
}

impl fmt::Debug for NativeImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(unix)]
        {
            let NativeImageHandle::Fd(fd) = self;
            return f.debug_tuple("NativeImageHandle::Fd").field(&fd.as_raw_fd()).finish();
        }
        #[cfg(windows)]
        {
            let NativeImageHandle::Win32Handle(h) = self;
            return f.debug_tuple("NativeImageHandle::Win32Handle").field(&h.0).finish();
        }
        #[cfg(target_os = "android")]
        {
            let NativeImageHandle::HardwareBuffer(h) = self;
            return f.debug_tuple("NativeImageHandle::HardwareBuffer").field(&h.0).finish();
        }
        #[allow(unreachable_code)]
        {
            f.write_str("NativeImageHandle")
        }
    }
}

/// Binary or timeline sync primitive, platform-specific.
pub enum NativeSyncHandle {
    /// `sync_fd` or opaque `fd`, Linux.
    #[cfg(unix)]
    Fd(OwnedFd),
    /// Win32 fence/semaphore handle.
    #[cfg(windows)]
    Win32Handle(RawWin32Handle),
}

/// Capability flags a device/backend advertises for sync primitives,
/// mirroring the source's `vk_bundle` capability bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCapabilities {
    /// Binary (non-timeline) semaphores can be exported/imported.
    pub binary_semaphores: bool,
    /// Timeline semaphores can be exported/imported.
    pub timeline_semaphores: bool,
    /// Fences can be exported as sync-fd (Linux) or equivalent.
    pub sync_fd_fences: bool,
    /// Fences can be exported as opaque fd/handle.
    pub opaque_fences: bool,
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn handle_roundtrips_through_raw_fd() {
        // /dev/null is always openable in test environments and gives us
        // a real fd to exercise ownership transfer without depending on
        // GPU resources.
        let file = std::fs::File::open("/dev/null").expect("open /dev/null");
        let raw = file.as_raw_fd();
        std::mem::forget(file); // hand ownership to NativeImageHandle below

        let handle = NativeImageHandle::from_raw_fd(raw);
        assert_eq!(handle.as_raw_fd(), raw);
        let returned = handle.into_raw_fd();
        assert_eq!(returned, raw);

        // Reclaim ownership as a File so it closes on drop.
        drop(unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(returned) });
    }
}
