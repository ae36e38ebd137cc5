// src/native.rs
//
// The seam between the safe wrappers and whatever provides the libheif
// entry points. `LibHeif` links the system library; tests plug in doubles.

use crate::config::MIN_SUPPORTED_VERSION;
use crate::ffi::{heif_context, heif_error, heif_writer};
use libc::c_void;
use std::fmt;

/// libheif release number, decoded from `heif_get_version_number()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibraryVersion {
    pub major: u8,
    pub minor: u8,
    pub maintenance: u8,
}

impl LibraryVersion {
    pub const fn new(major: u8, minor: u8, maintenance: u8) -> Self {
        Self {
            major,
            minor,
            maintenance,
        }
    }

    /// Decode the packed `0xHHMMLL00` representation.
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            major: (packed >> 24) as u8,
            minor: (packed >> 16) as u8,
            maintenance: (packed >> 8) as u8,
        }
    }

    pub const fn to_packed(self) -> u32 {
        ((self.major as u32) << 24) | ((self.minor as u32) << 16) | ((self.maintenance as u32) << 8)
    }

    /// Same major series as the targeted ABI and not older than the minimum.
    pub fn is_supported(&self) -> bool {
        self.major == MIN_SUPPORTED_VERSION.major && *self >= MIN_SUPPORTED_VERSION
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.maintenance)
    }
}

/// Provider of the libheif context entry points.
///
/// # Safety
/// Implementations must behave like libheif:
/// - `context_alloc` returns null or a pointer that stays valid until it is
///   passed to `context_free`;
/// - `context_write` invokes `writer.write` only synchronously, on the
///   calling thread, before it returns, and always with the given
///   `userdata`;
/// - nothing unwinds out of these methods.
pub unsafe trait NativeHeif {
    /// Packed `0xHHMMLL00` version of the library behind this backend.
    fn version_number(&self) -> u32;

    fn context_alloc(&self) -> *mut heif_context;

    /// # Safety
    /// `ctx` must come from `context_alloc` on this backend and must not be
    /// used afterwards.
    unsafe fn context_free(&self, ctx: *mut heif_context);

    /// # Safety
    /// `ctx` must be live; `userdata` must be whatever `writer.write`
    /// expects for the duration of the call.
    unsafe fn context_write(
        &self,
        ctx: *mut heif_context,
        writer: &mut heif_writer,
        userdata: *mut c_void,
    ) -> heif_error;

    fn version(&self) -> LibraryVersion {
        LibraryVersion::from_packed(self.version_number())
    }
}

/// The system libheif, linked as `-lheif`.
#[cfg(feature = "libheif")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LibHeif;

#[cfg(feature = "libheif")]
unsafe impl NativeHeif for LibHeif {
    fn version_number(&self) -> u32 {
        unsafe { crate::ffi::heif_get_version_number() }
    }

    fn context_alloc(&self) -> *mut heif_context {
        unsafe { crate::ffi::heif_context_alloc() }
    }

    unsafe fn context_free(&self, ctx: *mut heif_context) {
        unsafe { crate::ffi::heif_context_free(ctx) }
    }

    unsafe fn context_write(
        &self,
        ctx: *mut heif_context,
        writer: &mut heif_writer,
        userdata: *mut c_void,
    ) -> heif_error {
        unsafe { crate::ffi::heif_context_write(ctx, writer, userdata) }
    }
}
