// src/bin/empty_heif.rs
//
// Diagnostic harness: allocates one libheif context and writes it, empty,
// to `empty.heif` next to this executable. Takes no arguments.
// Exit status is 0 on success and non-zero on any escaping error.

use anyhow::Context;
use heif_context::config::{self, LOG_FILTER};
use heif_context::HeifContext;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(LOG_FILTER.as_str()).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output =
        config::harness_output_path().context("failed to locate the running executable")?;

    let mut heif = HeifContext::new().context("failed to create the libheif context")?;
    info!(
        version = %heif.library_version(),
        path = %output.display(),
        "writing empty container"
    );

    if let Err(err) = heif.write_to_file(&output) {
        error!(category = err.category().code(), %err, "write failed");
        return Err(err).with_context(|| format!("failed to write {}", output.display()));
    }

    info!(path = %output.display(), "done");
    Ok(())
}
