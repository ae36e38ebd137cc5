// src/config.rs
//
// Compile-time defaults and environment lookups.

use crate::native::LibraryVersion;
use once_cell::sync::Lazy;
use std::path::PathBuf;

/// File written by the diagnostic harness next to its executable.
pub const OUTPUT_FILE_NAME: &str = "empty.heif";

/// Oldest libheif release whose context/writer ABI this binding targets.
/// Only the 1.x series is accepted.
pub const MIN_SUPPORTED_VERSION: LibraryVersion = LibraryVersion::new(1, 9, 0);

/// Environment variable holding a `tracing` filter directive for the harness.
pub const LOG_ENV: &str = "HEIF_CONTEXT_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

/// Log filter read once from `HEIF_CONTEXT_LOG`, `warn` when unset or empty.
pub static LOG_FILTER: Lazy<String> = Lazy::new(|| {
    std::env::var(LOG_ENV)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
});

/// `empty.heif` in the directory containing the running executable.
pub fn harness_output_path() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("executable path {} has no parent directory", exe.display()),
        )
    })?;
    Ok(dir.join(OUTPUT_FILE_NAME))
}
