// src/context.rs
//
// Public libheif context: construction, serialization to a byte sink, and
// release. Instances are not safe for concurrent use; every mutating call
// takes `&mut self`.

use crate::codecs::heif_safe::SafeHeifContext;
use crate::error::{HeifError, Result, SinkOperation};
use crate::ffi::heif_error;
use crate::native::{LibraryVersion, NativeHeif};
use crate::stream::{CallbackFailure, HeifStreamWriter};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, Write};
use std::path::Path;
use tracing::debug;

#[cfg(feature = "libheif")]
use crate::native::LibHeif;

/// A libheif context owned by Rust.
///
/// The native context is freed exactly once: by [`release`](Self::release)
/// or when the value is dropped. Any operation after release fails with
/// [`HeifError::Disposed`] and never reaches native code.
pub struct HeifContext<N: NativeHeif> {
    context: SafeHeifContext<N>,
}

#[cfg(feature = "libheif")]
impl HeifContext<LibHeif> {
    /// Allocate a context on the system libheif.
    pub fn new() -> Result<Self> {
        Self::with_native(LibHeif)
    }
}

impl<N: NativeHeif> HeifContext<N> {
    /// Allocate a context on the given backend.
    ///
    /// Fails with [`HeifError::ResourceAllocation`] when the backend's
    /// version is unsupported or it cannot allocate a context.
    pub fn with_native(native: N) -> Result<Self> {
        Ok(Self {
            context: SafeHeifContext::new(native)?,
        })
    }

    /// Version of the library the context was allocated on. Recorded at
    /// construction, so it is still available after release.
    pub fn library_version(&self) -> LibraryVersion {
        self.context.version()
    }

    pub fn is_released(&self) -> bool {
        self.context.is_released()
    }

    /// Free the native context. Safe to call any number of times.
    pub fn release(&mut self) {
        self.context.release();
    }

    /// Write the context to `path`, creating or replacing the file.
    ///
    /// The file is opened for exclusive access; an existing file is only
    /// truncated once the lock is held. On success the data is synced to
    /// disk before returning.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty, blank, or malformed path
    /// - `Disposed` after [`release`](Self::release)
    /// - `CallbackFailure` when the local file could not be opened, locked,
    ///   written or flushed; the original `io::Error` is the source
    /// - `NativeOperation` when libheif failed on its own
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        validate_output_path(path)?;
        self.context.handle()?;

        let mut file = open_exclusive(path)?;
        let written = self.write_to_stream(&mut file)?;
        file.sync_all()
            .map_err(|e| HeifError::callback_failure(SinkOperation::Flush, e))?;

        debug!(target: "heif_context", path = %path.display(), bytes = written, "wrote context to file");
        Ok(())
    }

    /// Write the context to any seekable byte sink and return the number of
    /// bytes libheif produced. Pass `&mut sink` to keep the sink.
    pub fn write_to_stream<W: Write + Seek>(&mut self, stream: W) -> Result<u64> {
        self.context.handle()?;

        let mut adapter = HeifStreamWriter::new(stream);
        let mut writer = HeifStreamWriter::<W>::writer();
        // The adapter outlives the native call and is not touched from Rust
        // while libheif holds its userdata pointer.
        let status = unsafe { self.context.write(&mut writer, adapter.userdata())? };
        translate_write_outcome(status, adapter.take_failure())?;

        let written = adapter.bytes_written();
        adapter
            .get_mut()
            .flush()
            .map_err(|e| HeifError::callback_failure(SinkOperation::Flush, e))?;
        Ok(written)
    }
}

impl<N: NativeHeif> fmt::Debug for HeifContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeifContext")
            .field(
                "library_version",
                &format_args!("{}", self.library_version()),
            )
            .field("released", &self.is_released())
            .finish()
    }
}

/// A captured callback failure always wins over the native status: it names
/// the local cause, the native message only says the write failed. It is
/// raised even if libheif ignored the failing callback and reported success.
fn translate_write_outcome(status: heif_error, failure: Option<CallbackFailure>) -> Result<()> {
    if let Some(failure) = failure {
        return Err(failure.into_error());
    }
    if status.is_error() {
        // libheif messages are static or owned by the still-live context.
        return Err(unsafe { HeifError::from_native_status(&status) });
    }
    Ok(())
}

#[cfg(windows)]
const RESERVED_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

pub(crate) fn validate_output_path(path: &Path) -> Result<()> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(HeifError::invalid_argument("path", "", "Path must not be empty"));
    }

    let lossy = raw.to_string_lossy();
    if lossy.trim().is_empty() {
        return Err(HeifError::invalid_argument(
            "path",
            lossy.into_owned(),
            "Path must not consist only of whitespace",
        ));
    }
    if lossy.contains('\0') {
        return Err(HeifError::invalid_argument(
            "path",
            lossy.into_owned(),
            "Path must not contain NUL characters",
        ));
    }

    #[cfg(windows)]
    if lossy
        .chars()
        .any(|c| RESERVED_PATH_CHARS.contains(&c) || (c as u32) < 32)
    {
        return Err(HeifError::invalid_argument(
            "path",
            lossy.into_owned(),
            "Path contains characters that are invalid on this filesystem",
        ));
    }

    Ok(())
}

fn open_exclusive(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }

    let file = options
        .open(path)
        .map_err(|e| HeifError::callback_failure(SinkOperation::Open, e))?;
    #[cfg(unix)]
    lock_exclusive(&file)?;
    file.set_len(0)
        .map_err(|e| HeifError::callback_failure(SinkOperation::Truncate, e))?;
    Ok(file)
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(HeifError::callback_failure(
            SinkOperation::Lock,
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeErrorKind;
    use crate::ffi;
    use crate::native::fake::{FakeHeif, PAYLOAD};
    use std::error::Error as _;
    use std::io::{self, Cursor, SeekFrom};
    use std::panic::{self, AssertUnwindSafe};

    struct BrokenSink {
        panic_instead: bool,
    }

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            if self.panic_instead {
                panic!("sink panicked inside native call");
            }
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for BrokenSink {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn write_to_stream_collects_native_output() {
        let mut fake = FakeHeif::new();
        fake.chunk = 5;
        let calls = fake.calls.clone();
        let mut ctx = HeifContext::with_native(fake).unwrap();

        let mut sink = Cursor::new(Vec::new());
        let written = ctx.write_to_stream(&mut sink).unwrap();
        assert_eq!(written, PAYLOAD.len() as u64);
        assert_eq!(sink.into_inner(), PAYLOAD);
        assert_eq!(calls.writes.get(), 1);
    }

    #[test]
    fn write_to_file_creates_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.heif");
        std::fs::write(&path, vec![0xAA; 4096]).unwrap();

        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();
        ctx.write_to_file(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), PAYLOAD);
    }

    #[test]
    fn callback_failure_beats_native_message() {
        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();
        let err = ctx
            .write_to_stream(BrokenSink {
                panic_instead: false,
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(err.sink_operation(), Some(SinkOperation::Write));
        let io_err = err.source().unwrap().downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn native_failure_without_callback_failure() {
        let mut fake = FakeHeif::new();
        fake.status = Some(ffi::heif_error::with_static_message(
            ffi::heif_error_Encoder_plugin_error,
            ffi::heif_suberror_Unspecified,
            c"encoder plugin missing",
        ));
        let mut ctx = HeifContext::with_native(fake).unwrap();

        let err = ctx.write_to_stream(Cursor::new(Vec::new())).unwrap_err();
        match err {
            HeifError::NativeOperation { kind, message, .. } => {
                assert_eq!(kind, NativeErrorKind::EncoderPlugin);
                assert_eq!(message, "encoder plugin missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn captured_failure_raised_even_if_native_reports_success() {
        let ignored = translate_write_outcome(
            heif_error::ok(),
            Some(CallbackFailure::Io {
                operation: SinkOperation::Seek,
                error: io::Error::new(io::ErrorKind::Other, "seek failed"),
            }),
        )
        .unwrap_err();
        assert_eq!(ignored.sink_operation(), Some(SinkOperation::Seek));
    }

    #[test]
    fn panic_in_sink_resumes_after_native_returns() {
        let fake = FakeHeif::new();
        let calls = fake.calls.clone();
        let mut ctx = HeifContext::with_native(fake).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.write_to_stream(BrokenSink {
                panic_instead: true,
            })
        }));
        assert!(result.is_err(), "panic should resume on the caller side");
        assert_eq!(calls.writes.get(), 1, "native call completed normally");
        assert!(!ctx.is_released());

        drop(ctx);
        assert_eq!(calls.live(), 0);
    }

    #[test]
    fn operations_after_release_are_disposed() {
        let fake = FakeHeif::new();
        let calls = fake.calls.clone();
        let mut ctx = HeifContext::with_native(fake).unwrap();
        ctx.release();
        ctx.release();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.heif");
        assert!(matches!(ctx.write_to_file(&path), Err(HeifError::Disposed)));
        assert!(matches!(
            ctx.write_to_stream(Cursor::new(Vec::new())),
            Err(HeifError::Disposed)
        ));
        assert!(!path.exists(), "no file is created after release");
        assert_eq!(calls.writes.get(), 0);
        assert_eq!(calls.frees.get(), 1);
    }

    #[test]
    fn invalid_paths_are_rejected_before_native_calls() {
        let fake = FakeHeif::new();
        let calls = fake.calls.clone();
        let mut ctx = HeifContext::with_native(fake).unwrap();

        for bad in ["", "   ", "out\0.heif"] {
            let err = ctx.write_to_file(bad).unwrap_err();
            assert!(
                matches!(err, HeifError::InvalidArgument { .. }),
                "{bad:?} gave {err:?}"
            );
        }
        assert_eq!(calls.writes.get(), 0);
    }

    #[test]
    fn argument_validation_precedes_disposed_check() {
        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();
        ctx.release();
        assert!(matches!(
            ctx.write_to_file(""),
            Err(HeifError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn missing_directory_is_a_callback_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("empty.heif");
        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();

        let err = ctx.write_to_file(&path).unwrap_err();
        assert_eq!(err.sink_operation(), Some(SinkOperation::Open));
        let io_err = err.source().unwrap().downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn locked_file_is_not_truncated() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held.heif");
        std::fs::write(&path, b"keep me").unwrap();
        let holder = File::open(&path).unwrap();
        let rc = unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(rc, 0);

        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();
        let err = ctx.write_to_file(&path).unwrap_err();
        assert_eq!(err.sink_operation(), Some(SinkOperation::Lock));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
        drop(holder);
    }

    #[test]
    fn debug_reports_state() {
        let mut ctx = HeifContext::with_native(FakeHeif::new()).unwrap();
        assert!(format!("{ctx:?}").contains("released: false"));
        ctx.release();
        assert!(format!("{ctx:?}").contains("released: true"));
        assert!(format!("{ctx:?}").contains("1.17.6"));
    }

    #[test]
    fn released_context_never_queries_native_version() {
        let fake = FakeHeif::new();
        let calls = fake.calls.clone();
        let mut ctx = HeifContext::with_native(fake).unwrap();
        ctx.release();

        assert_eq!(ctx.library_version().to_string(), "1.17.6");
        let _ = format!("{ctx:?}");
        assert_eq!(calls.versions.get(), 1, "only the construction-time check");
    }
}
