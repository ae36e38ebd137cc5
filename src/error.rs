// src/error.rs
//
// Unified error handling for heif-context
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid arguments or use after release, recoverable
// - CodecError: libheif reported a failure
// - ResourceLimit: Native allocation or local byte sink failures
// - InternalBug: Library bugs (should not happen)

use crate::ffi;
use libc::c_int;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Error taxonomy used to decide how a caller can react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input or invalid object state, recoverable by the caller
    UserError,
    /// libheif rejected the operation
    CodecError,
    /// Native memory or local I/O exhausted or denied
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Get the HEIF_CONTEXT_* error code string for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "HEIF_CONTEXT_USER_ERROR",
            ErrorCategory::CodecError => "HEIF_CONTEXT_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "HEIF_CONTEXT_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "HEIF_CONTEXT_INTERNAL_BUG",
        }
    }
}

/// Translated `heif_error_code`. Raw codes never leave the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    InputDoesNotExist,
    InvalidInput,
    UnsupportedFiletype,
    UnsupportedFeature,
    UsageError,
    MemoryAllocation,
    DecoderPlugin,
    EncoderPlugin,
    Encoding,
    ColorProfileDoesNotExist,
    PluginLoading,
    Canceled,
    /// A code this binding does not know about (newer libheif).
    Unknown,
}

impl NativeErrorKind {
    pub(crate) fn from_code(code: c_int) -> Self {
        match code {
            ffi::heif_error_Input_does_not_exist => Self::InputDoesNotExist,
            ffi::heif_error_Invalid_input => Self::InvalidInput,
            ffi::heif_error_Unsupported_filetype => Self::UnsupportedFiletype,
            ffi::heif_error_Unsupported_feature => Self::UnsupportedFeature,
            ffi::heif_error_Usage_error => Self::UsageError,
            ffi::heif_error_Memory_allocation_error => Self::MemoryAllocation,
            ffi::heif_error_Decoder_plugin_error => Self::DecoderPlugin,
            ffi::heif_error_Encoder_plugin_error => Self::EncoderPlugin,
            ffi::heif_error_Encoding_error => Self::Encoding,
            ffi::heif_error_Color_profile_does_not_exist => Self::ColorProfileDoesNotExist,
            ffi::heif_error_Plugin_loading_error => Self::PluginLoading,
            ffi::heif_error_Canceled => Self::Canceled,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for NativeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputDoesNotExist => "input does not exist",
            Self::InvalidInput => "invalid input",
            Self::UnsupportedFiletype => "unsupported file type",
            Self::UnsupportedFeature => "unsupported feature",
            Self::UsageError => "usage error",
            Self::MemoryAllocation => "memory allocation error",
            Self::DecoderPlugin => "decoder plugin error",
            Self::EncoderPlugin => "encoder plugin error",
            Self::Encoding => "encoding error",
            Self::ColorProfileDoesNotExist => "color profile does not exist",
            Self::PluginLoading => "plugin loading error",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// Byte sink operation that raised a local I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOperation {
    Open,
    Lock,
    Truncate,
    Write,
    Seek,
    Position,
    Size,
    Flush,
}

impl fmt::Display for SinkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Lock => "lock",
            Self::Truncate => "truncate",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Position => "position",
            Self::Size => "size",
            Self::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// heif-context error types
#[derive(Debug, Error)]
pub enum HeifError {
    /// The native context could not be created, or the linked libheif is
    /// not a version this binding supports.
    #[error("{message}")]
    ResourceAllocation { message: Cow<'static, str> },

    /// `heif_context_write` failed and no callback failure explains why.
    #[error("libheif {kind} (subcode {subcode}): {message}")]
    NativeOperation {
        kind: NativeErrorKind,
        subcode: i32,
        message: Cow<'static, str>,
    },

    /// A local byte sink operation failed. Displays the original message.
    #[error("{source}")]
    CallbackFailure {
        operation: SinkOperation,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {name}: {value:?}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("The HeifContext has been released")]
    Disposed,
}

// Constructor Helpers
impl HeifError {
    pub fn allocation_failed() -> Self {
        Self::ResourceAllocation {
            message: Cow::Borrowed("Unable to create the native HeifContext."),
        }
    }

    pub fn unsupported_version(found: impl fmt::Display, minimum: impl fmt::Display) -> Self {
        Self::ResourceAllocation {
            message: Cow::Owned(format!(
                "The LibHeif version is not supported (found {found}, requires {minimum} or a later 1.x)."
            )),
        }
    }

    pub fn native_operation(
        kind: NativeErrorKind,
        subcode: i32,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::NativeOperation {
            kind,
            subcode,
            message: message.into(),
        }
    }

    /// Translate a failing libheif status.
    ///
    /// # Safety
    /// `status.message` must be null or a valid NUL-terminated string.
    pub(crate) unsafe fn from_native_status(status: &ffi::heif_error) -> Self {
        let message = unsafe { status.message_lossy() };
        Self::native_operation(
            NativeErrorKind::from_code(status.code),
            status.subcode,
            message,
        )
    }

    pub fn callback_failure(operation: SinkOperation, source: std::io::Error) -> Self {
        Self::CallbackFailure { operation, source }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn disposed() -> Self {
        Self::Disposed
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are
    /// recoverable, CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } | Self::Disposed => ErrorCategory::UserError,

            Self::NativeOperation { kind, .. } => match kind {
                NativeErrorKind::MemoryAllocation => ErrorCategory::ResourceLimit,
                NativeErrorKind::UsageError => ErrorCategory::InternalBug,
                _ => ErrorCategory::CodecError,
            },

            // Disk full, permission denied and friends; the caller can pick
            // another destination.
            Self::ResourceAllocation { .. } | Self::CallbackFailure { .. } => {
                ErrorCategory::ResourceLimit
            }
        }
    }

    /// Sink operation behind a callback failure, if any.
    pub fn sink_operation(&self) -> Option<SinkOperation> {
        match self {
            Self::CallbackFailure { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, HeifError>;
