// lib.rs
//
// heif-context: a safe Rust binding over the libheif context lifecycle
//
// Design goals:
// - The native context is freed exactly once, on every exit path
// - No Rust error or panic ever unwinds through libheif
// - Native status codes surface as typed errors, never as raw integers
#![deny(unsafe_op_in_unsafe_fn)]

pub mod codecs;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod native;
pub mod stream;

pub use context::HeifContext;
pub use error::{ErrorCategory, HeifError, NativeErrorKind, Result, SinkOperation};
#[cfg(feature = "libheif")]
pub use native::LibHeif;
pub use native::{LibraryVersion, NativeHeif};
pub use stream::{CallbackFailure, HeifStreamWriter, StreamCallbacks};
