// tests/common/mod.rs
//
// Scripted stand-in for libheif shared by the integration tests.

#![allow(dead_code)]

use heif_context::ffi::{self, heif_context as raw_context, heif_error, heif_writer};
use heif_context::{LibraryVersion, NativeHeif};
use libc::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bytes the scripted backend "serializes": an `ftyp` box header.
pub const EMPTY_CONTAINER: &[u8] = b"\0\0\0\x18ftypheic\0\0\0\0mif1heic";

#[derive(Default)]
pub struct Counters {
    pub versions: AtomicUsize,
    pub allocs: AtomicUsize,
    pub frees: AtomicUsize,
    pub writes: AtomicUsize,
}

impl Counters {
    pub fn versions(&self) -> usize {
        self.versions.load(Ordering::SeqCst)
    }

    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedHeif {
    pub version: LibraryVersion,
    pub fail_alloc: bool,
    pub fail_status: Option<heif_error>,
    pub counters: Arc<Counters>,
}

impl ScriptedHeif {
    pub fn new() -> Self {
        Self {
            version: LibraryVersion::new(1, 18, 2),
            fail_alloc: false,
            fail_status: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_version(version: LibraryVersion) -> Self {
        Self {
            version,
            ..Self::new()
        }
    }
}

// Send: the raw status holds only a pointer to a static C string.
unsafe impl Send for ScriptedHeif {}

struct ScriptedContext {
    _serial: usize,
}

unsafe impl NativeHeif for ScriptedHeif {
    fn version_number(&self) -> u32 {
        self.counters.versions.fetch_add(1, Ordering::SeqCst);
        self.version.to_packed()
    }

    fn context_alloc(&self) -> *mut raw_context {
        if self.fail_alloc {
            return std::ptr::null_mut();
        }
        let serial = self.counters.allocs.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(ScriptedContext { _serial: serial })).cast()
    }

    unsafe fn context_free(&self, ctx: *mut raw_context) {
        drop(unsafe { Box::from_raw(ctx.cast::<ScriptedContext>()) });
        self.counters.frees.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn context_write(
        &self,
        ctx: *mut raw_context,
        writer: &mut heif_writer,
        userdata: *mut c_void,
    ) -> heif_error {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        let Some(write) = writer.write else {
            return heif_error::with_static_message(
                ffi::heif_error_Usage_error,
                ffi::heif_suberror_Null_pointer_argument,
                c"missing write callback",
            );
        };
        let (head, tail) = EMPTY_CONTAINER.split_at(8);
        for chunk in [head, tail] {
            let err = unsafe { write(ctx, chunk.as_ptr().cast(), chunk.len(), userdata) };
            if err.is_error() {
                return err;
            }
        }
        self.fail_status.unwrap_or_else(heif_error::ok)
    }
}

pub fn encoder_failure() -> heif_error {
    heif_error::with_static_message(
        ffi::heif_error_Encoding_error,
        ffi::heif_suberror_Unspecified,
        c"scripted encoder failure",
    )
}
