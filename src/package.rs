//! Staging directory output and archive creation.
//!
//! A bundle is written to `<staging>/manifest.json` and
//! `<staging>/_locales/<tag>/messages.json`, then the whole staging tree
//! is zipped.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bundle::EngineBundle;
use crate::{ConvertError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LOCALES_DIR: &str = "_locales";
pub const MESSAGES_FILE: &str = "messages.json";

/// Renders a bundle into `(relative path, contents)` pairs.
///
/// Output uses two-space indentation and a trailing newline.
pub fn render(bundle: &EngineBundle) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::with_capacity(bundle.locales().len() + 1);

    let mut manifest = serde_json::to_vec_pretty(&bundle.manifest())?;
    manifest.push(b'\n');
    files.push((MANIFEST_FILE.to_string(), manifest));

    for (tag, catalog) in bundle.locales() {
        let mut messages = serde_json::to_vec_pretty(catalog)?;
        messages.push(b'\n');
        files.push((format!("{}/{}/{}", LOCALES_DIR, tag, MESSAGES_FILE), messages));
    }

    Ok(files)
}

/// Fails if the staging directory already exists.
pub async fn ensure_absent(staging_dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(staging_dir).await? {
        return Err(ConvertError::OutputAlreadyExists(staging_dir.to_path_buf()));
    }
    Ok(())
}

/// Creates a fresh staging directory, refusing to reuse an existing one.
pub async fn create_staging(staging_dir: &Path) -> Result<()> {
    if let Some(parent) = staging_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::create_dir(staging_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(ConvertError::OutputAlreadyExists(staging_dir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes the manifest and message catalogs into the staging directory.
pub async fn write_bundle(bundle: &EngineBundle, staging_dir: &Path) -> Result<()> {
    bundle.check_references()?;

    for (relative, contents) in render(bundle)? {
        let path = staging_dir.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        debug!("Wrote {}", path.display());
    }
    Ok(())
}

/// Zips the staging directory into `archive_path`.
pub async fn create_archive(staging_dir: &Path, archive_path: &Path) -> Result<PathBuf> {
    let staging_dir = staging_dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();

    let written = tokio::task::spawn_blocking(move || {
        zip_dir(&staging_dir, &archive_path).map(|()| archive_path)
    })
    .await
    .map_err(|e| ConvertError::Archive(format!("archive task failed: {}", e)))??;

    info!("Created archive {}", written.display());
    Ok(written)
}

fn zip_dir(source_dir: &Path, archive_path: &Path) -> Result<()> {
    let mut entries = Vec::new();
    collect_files(source_dir, source_dir, &mut entries)?;
    entries.sort();

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(archive_path).map_err(|e| {
        ConvertError::Archive(format!(
            "Failed to create archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for relative in entries {
        let bytes = std::fs::read(source_dir.join(&relative))?;
        writer
            .start_file(relative.as_str(), options)
            .map_err(|e| ConvertError::Archive(format!("Failed to add {}: {}", relative, e)))?;
        writer.write_all(&bytes)?;
    }

    writer
        .finish()
        .map_err(|e| ConvertError::Archive(format!("Failed to finish archive: {}", e)))?;
    Ok(())
}

/// Collects file paths under `dir`, relative to `root`, using `/` separators.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}
