//! Archive packaging: turn a job sandbox into one distributable ZIP.
//!
//! The archive root holds the per-host directories exactly as stored, so
//! unzipping reproduces the browsable tree. Not called by the engine; the
//! CLI and the surrounding job layer invoke it after a finished run.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::storage::Storage;

/// Pack every stored file into a deflate ZIP at `out_path`.
///
/// Returns the archive size in bytes.
///
/// # Errors
///
/// Storage reads and archive I/O failures.
pub async fn pack_to_file(storage: &Storage, out_path: &Path) -> Result<u64> {
    let files = storage.list_files().await.context("listing sandbox files")?;

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating archive output dir {}", parent.display()))?;
    }

    let out_file = std::fs::File::create(out_path)
        .with_context(|| format!("creating archive {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for rel in &files {
        zip.start_file(rel.clone(), options)
            .with_context(|| format!("starting archive entry {rel}"))?;
        let bytes = storage
            .read(rel)
            .await
            .with_context(|| format!("reading {rel} for archiving"))?;
        zip.write_all(&bytes)
            .with_context(|| format!("writing archive entry {rel}"))?;
    }

    let out_file = zip.finish().context("finalising archive")?;
    let size = out_file
        .metadata()
        .context("reading archive metadata")?
        .len();
    log::info!(
        "packed {} files into {} ({size} bytes)",
        files.len(),
        out_path.display()
    );
    Ok(size)
}
