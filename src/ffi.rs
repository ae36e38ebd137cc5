// src/ffi.rs
//
// C ABI of the libheif entry points this crate consumes.
// Layouts follow libheif 1.x `heif.h`; only the context lifecycle and the
// writer callback table are declared.
#![allow(non_camel_case_types, non_upper_case_globals)]

use libc::{c_char, c_int, c_void};
use std::ffi::CStr;
use std::marker::{PhantomData, PhantomPinned};

/// Opaque libheif context. Only ever handled behind a pointer.
#[repr(C)]
pub struct heif_context {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

// enum heif_error_code
pub const heif_error_Ok: c_int = 0;
pub const heif_error_Input_does_not_exist: c_int = 1;
pub const heif_error_Invalid_input: c_int = 2;
pub const heif_error_Unsupported_filetype: c_int = 3;
pub const heif_error_Unsupported_feature: c_int = 4;
pub const heif_error_Usage_error: c_int = 5;
pub const heif_error_Memory_allocation_error: c_int = 6;
pub const heif_error_Decoder_plugin_error: c_int = 7;
pub const heif_error_Encoder_plugin_error: c_int = 8;
pub const heif_error_Encoding_error: c_int = 9;
pub const heif_error_Color_profile_does_not_exist: c_int = 10;
pub const heif_error_Plugin_loading_error: c_int = 11;
pub const heif_error_Canceled: c_int = 12;

// enum heif_suberror_code (subset)
pub const heif_suberror_Unspecified: c_int = 0;
pub const heif_suberror_Null_pointer_argument: c_int = 2001;
pub const heif_suberror_Invalid_parameter_value: c_int = 2006;
pub const heif_suberror_Cannot_write_output_data: c_int = 5000;

/// `struct heif_error`, returned by value from most libheif calls.
///
/// `message` points to a static or context-owned C string; it is never
/// freed by the receiver.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct heif_error {
    pub code: c_int,
    pub subcode: c_int,
    pub message: *const c_char,
}

impl heif_error {
    pub const fn ok() -> Self {
        Self {
            code: heif_error_Ok,
            subcode: heif_suberror_Unspecified,
            message: c"Success".as_ptr(),
        }
    }

    /// Build a status whose message has static lifetime, as libheif requires
    /// for errors handed back from writer callbacks.
    pub const fn with_static_message(code: c_int, subcode: c_int, message: &'static CStr) -> Self {
        Self {
            code,
            subcode,
            message: message.as_ptr(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code != heif_error_Ok
    }

    /// Copy the message out. A null pointer yields an empty string.
    ///
    /// # Safety
    /// `message` must be null or point to a NUL-terminated string that is
    /// valid for the duration of this call.
    pub unsafe fn message_lossy(&self) -> String {
        if self.message.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(self.message) }
            .to_string_lossy()
            .into_owned()
    }
}

pub type heif_writer_write_fn = unsafe extern "C" fn(
    ctx: *mut heif_context,
    data: *const c_void,
    size: usize,
    userdata: *mut c_void,
) -> heif_error;

/// `struct heif_writer`, the byte sink table consumed by `heif_context_write`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct heif_writer {
    /// Must be 1.
    pub writer_api_version: c_int,
    pub write: Option<heif_writer_write_fn>,
}

pub const HEIF_WRITER_API_VERSION: c_int = 1;

// Positioning callbacks use the `heif_reader` return conventions:
// position and size report -1 on failure, seek reports 0 on success.
pub type heif_get_position_fn = unsafe extern "C" fn(userdata: *mut c_void) -> i64;
pub type heif_seek_fn = unsafe extern "C" fn(position: i64, userdata: *mut c_void) -> c_int;
pub type heif_get_size_fn = unsafe extern "C" fn(userdata: *mut c_void) -> i64;

#[cfg(feature = "libheif")]
#[link(name = "heif")]
extern "C" {
    /// Packed as `0xHHMMLL00` (major, minor, maintenance).
    pub fn heif_get_version_number() -> u32;
    pub fn heif_context_alloc() -> *mut heif_context;
    pub fn heif_context_free(ctx: *mut heif_context);
    pub fn heif_context_write(
        ctx: *mut heif_context,
        writer: *mut heif_writer,
        userdata: *mut c_void,
    ) -> heif_error;
}
