// src/stream.rs
//
// Byte-stream adapter: exposes a Rust `Write + Seek` sink to libheif as a C
// callback table.
//
// Nothing may unwind through the `extern "C"` trampolines. Every failure
// raised by the sink (an `io::Error` or a panic) is parked in a single slot
// and the trampoline reports a failing status to native code instead. The
// owner inspects the slot once the native call has returned.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::error::{HeifError, SinkOperation};
use crate::ffi::{self, heif_context, heif_error, heif_writer};
use libc::{c_int, c_void};
use std::any::Any;
use std::io::{self, Seek, SeekFrom, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

const WRITE_FAILED: heif_error = heif_error::with_static_message(
    ffi::heif_error_Encoding_error,
    ffi::heif_suberror_Cannot_write_output_data,
    c"Cannot write output data",
);

const NULL_DATA: heif_error = heif_error::with_static_message(
    ffi::heif_error_Usage_error,
    ffi::heif_suberror_Null_pointer_argument,
    c"Write callback received a null data pointer",
);

const OVERSIZED_DATA: heif_error = heif_error::with_static_message(
    ffi::heif_error_Usage_error,
    ffi::heif_suberror_Invalid_parameter_value,
    c"Write callback received a length larger than isize::MAX",
);

const NULL_USERDATA: heif_error = heif_error::with_static_message(
    ffi::heif_error_Usage_error,
    ffi::heif_suberror_Null_pointer_argument,
    c"Write callback received a null userdata pointer",
);

/// Failure raised inside a callback while native code was on the stack.
pub enum CallbackFailure {
    Io {
        operation: SinkOperation,
        error: io::Error,
    },
    Panic(Box<dyn Any + Send + 'static>),
}

impl CallbackFailure {
    /// Re-raise on the Rust side. I/O failures become
    /// `HeifError::CallbackFailure`; panics resume unwinding here.
    pub fn into_error(self) -> HeifError {
        match self {
            Self::Io { operation, error } => HeifError::callback_failure(operation, error),
            Self::Panic(payload) => panic::resume_unwind(payload),
        }
    }
}

impl std::fmt::Debug for CallbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { operation, error } => f
                .debug_struct("Io")
                .field("operation", operation)
                .field("error", error)
                .finish(),
            Self::Panic(payload) => f
                .debug_tuple("Panic")
                .field(&panic_message(payload.as_ref()))
                .finish(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Full callback table. `write` is the only entry libheif's writer uses;
/// the positioning entries follow the `heif_reader` conventions.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StreamCallbacks {
    pub write: ffi::heif_writer_write_fn,
    pub get_position: ffi::heif_get_position_fn,
    pub seek: ffi::heif_seek_fn,
    pub get_size: ffi::heif_get_size_fn,
}

/// Adapter from a Rust byte sink to libheif callbacks.
///
/// Pass `&mut F` to keep ownership of the sink with the caller (closing the
/// adapter leaves `F` open), or `F` by value to hand it over and get it back
/// with [`into_inner`](Self::into_inner).
pub struct HeifStreamWriter<W: Write + Seek> {
    stream: W,
    failure: Option<CallbackFailure>,
    bytes_written: u64,
}

impl<W: Write + Seek> HeifStreamWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            failure: None,
            bytes_written: 0,
        }
    }

    pub fn callbacks() -> StreamCallbacks {
        StreamCallbacks {
            write: Self::write_callback,
            get_position: Self::position_callback,
            seek: Self::seek_callback,
            get_size: Self::size_callback,
        }
    }

    /// `heif_writer` (API version 1) routed to this adapter type.
    pub fn writer() -> heif_writer {
        heif_writer {
            writer_api_version: ffi::HEIF_WRITER_API_VERSION,
            write: Some(Self::write_callback),
        }
    }

    /// Pointer to hand to native code as `userdata`. Valid while `self` is
    /// neither moved nor dropped.
    pub fn userdata(&mut self) -> *mut c_void {
        (self as *mut Self).cast()
    }

    pub fn has_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Consume the captured failure, leaving the slot empty.
    pub fn take_failure(&mut self) -> Option<CallbackFailure> {
        self.failure.take()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.stream
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    /// Write the whole slice. Returns `false` once a failure is captured.
    pub fn write_bytes(&mut self, data: &[u8]) -> bool {
        let written = self.guarded(SinkOperation::Write, |s| s.write_all(data));
        if written.is_some() {
            self.bytes_written += data.len() as u64;
        }
        written.is_some()
    }

    pub fn position(&mut self) -> Option<u64> {
        self.guarded(SinkOperation::Position, |s| s.stream_position())
    }

    pub fn seek_to(&mut self, position: u64) -> bool {
        self.guarded(SinkOperation::Seek, |s| s.seek(SeekFrom::Start(position)))
            .is_some()
    }

    /// Total sink length. The current position is preserved.
    pub fn size(&mut self) -> Option<u64> {
        self.guarded(SinkOperation::Size, |s| {
            let current = s.stream_position()?;
            let end = s.seek(SeekFrom::End(0))?;
            if end != current {
                s.seek(SeekFrom::Start(current))?;
            }
            Ok(end)
        })
    }

    /// Run `f` against the sink, parking any error or panic.
    /// Once a failure is parked the sink is no longer touched.
    fn guarded<T>(
        &mut self,
        operation: SinkOperation,
        f: impl FnOnce(&mut W) -> io::Result<T>,
    ) -> Option<T> {
        if self.failure.is_some() {
            return None;
        }
        let stream = &mut self.stream;
        match panic::catch_unwind(AssertUnwindSafe(|| f(stream))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                warn!(target: "heif_context", %operation, %error, "byte sink callback failed");
                self.failure = Some(CallbackFailure::Io { operation, error });
                None
            }
            Err(payload) => {
                warn!(
                    target: "heif_context",
                    %operation,
                    panic = panic_message(payload.as_ref()),
                    "byte sink callback panicked"
                );
                self.failure = Some(CallbackFailure::Panic(payload));
                None
            }
        }
    }

    /// # Safety
    /// `userdata` must be null or come from [`userdata`](Self::userdata) on
    /// a live adapter of this exact type, not aliased elsewhere for the
    /// duration of the call.
    unsafe fn from_userdata<'a>(userdata: *mut c_void) -> Option<&'a mut Self> {
        unsafe { userdata.cast::<Self>().as_mut() }
    }

    unsafe extern "C" fn write_callback(
        _ctx: *mut heif_context,
        data: *const c_void,
        size: usize,
        userdata: *mut c_void,
    ) -> heif_error {
        let Some(this) = (unsafe { Self::from_userdata(userdata) }) else {
            return NULL_USERDATA;
        };
        if size == 0 {
            return heif_error::ok();
        }
        if data.is_null() {
            return NULL_DATA;
        }
        if size > isize::MAX as usize {
            return OVERSIZED_DATA;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size) };
        if this.write_bytes(bytes) {
            heif_error::ok()
        } else {
            WRITE_FAILED
        }
    }

    unsafe extern "C" fn position_callback(userdata: *mut c_void) -> i64 {
        let Some(this) = (unsafe { Self::from_userdata(userdata) }) else {
            return -1;
        };
        this.position()
            .and_then(|p| i64::try_from(p).ok())
            .unwrap_or(-1)
    }

    unsafe extern "C" fn seek_callback(position: i64, userdata: *mut c_void) -> c_int {
        let Some(this) = (unsafe { Self::from_userdata(userdata) }) else {
            return -1;
        };
        let Ok(position) = u64::try_from(position) else {
            return -1;
        };
        if this.seek_to(position) {
            0
        } else {
            -1
        }
    }

    unsafe extern "C" fn size_callback(userdata: *mut c_void) -> i64 {
        let Some(this) = (unsafe { Self::from_userdata(userdata) }) else {
            return -1;
        };
        this.size().and_then(|s| i64::try_from(s).ok()).unwrap_or(-1)
    }
}
