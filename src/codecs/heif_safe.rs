// src/codecs/heif_safe.rs
//
// Safe ownership of a native libheif context.
// The handle is freed exactly once, either through `release()` or on drop,
// and every use after release fails with `HeifError::Disposed` without
// touching native code.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::config::MIN_SUPPORTED_VERSION;
use crate::error::HeifError;
use crate::ffi::{heif_context, heif_error, heif_writer};
use crate::native::{LibraryVersion, NativeHeif};
use libc::c_void;
use std::ptr::NonNull;
use tracing::debug;
#[cfg(test)]
use std::{cell::Cell, thread_local};

#[cfg(test)]
thread_local! {
    static TRACK_DROPS: Cell<bool> = Cell::new(false);
    static LIVE_CONTEXTS: Cell<usize> = Cell::new(0);
}

/// Owning wrapper for `heif_context*` together with the backend that
/// allocated it.
pub struct SafeHeifContext<N: NativeHeif> {
    ptr: Option<NonNull<heif_context>>,
    version: LibraryVersion,
    native: N,
}

// libheif contexts have no thread affinity. Shared access is still
// unsound, so the handle is deliberately not `Sync`.
unsafe impl<N: NativeHeif + Send> Send for SafeHeifContext<N> {}

impl<N: NativeHeif> SafeHeifContext<N> {
    /// Allocate a context on `native`.
    ///
    /// The library version is checked first, so a rejected version never
    /// leaves a handle behind.
    ///
    /// # Returns
    /// `HeifError::ResourceAllocation` when the version is unsupported or
    /// the allocator returned null.
    pub fn new(native: N) -> Result<Self, HeifError> {
        let version = native.version();
        if !version.is_supported() {
            return Err(HeifError::unsupported_version(
                version,
                MIN_SUPPORTED_VERSION,
            ));
        }

        let ptr = NonNull::new(native.context_alloc()).ok_or_else(HeifError::allocation_failed)?;
        debug!(target: "heif_context", %version, ptr = ?ptr.as_ptr(), "allocated native context");
        #[cfg(test)]
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                LIVE_CONTEXTS.with(|c| c.set(c.get() + 1));
            }
        });
        Ok(Self {
            ptr: Some(ptr),
            version,
            native,
        })
    }

    /// Version checked at construction. Stays readable after release and
    /// never queries the backend again.
    pub fn version(&self) -> LibraryVersion {
        self.version
    }

    pub fn is_released(&self) -> bool {
        self.ptr.is_none()
    }

    /// Raw handle, or `Disposed` once released.
    pub fn handle(&self) -> Result<NonNull<heif_context>, HeifError> {
        self.ptr.ok_or(HeifError::Disposed)
    }

    /// Serialize the context through `writer`.
    ///
    /// Returns the raw native status; translating it is the caller's job
    /// because only the caller knows whether a callback failure explains it.
    ///
    /// # Safety
    /// `userdata` must be what `writer.write` expects and must stay valid
    /// until this call returns.
    pub unsafe fn write(
        &self,
        writer: &mut heif_writer,
        userdata: *mut c_void,
    ) -> Result<heif_error, HeifError> {
        let ctx = self.handle()?;
        Ok(unsafe { self.native.context_write(ctx.as_ptr(), writer, userdata) })
    }

    /// Free the native context. Later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { self.native.context_free(ptr.as_ptr()) };
            debug!(target: "heif_context", ptr = ?ptr.as_ptr(), "released native context");
            #[cfg(test)]
            TRACK_DROPS.with(|flag| {
                if flag.get() {
                    LIVE_CONTEXTS.with(|c| c.set(c.get().saturating_sub(1)));
                }
            });
        }
    }
}

impl<N: NativeHeif> Drop for SafeHeifContext<N> {
    fn drop(&mut self) {
        self.release();
    }
}
