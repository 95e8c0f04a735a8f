//! Icon materialization for packaged bundles.

use std::path::{Component, Path};

use tracing::debug;

use crate::descriptor::IconRef;
use crate::{ConvertError, Result};

/// Base name of the icon file written into a bundle.
pub const ICON_STEM: &str = "favicon";

/// How a bundle refers to its icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    /// External favicon URL, nothing written.
    RemoteUrl(String),
    /// File written into the bundle, path relative to the bundle root.
    File(String),
    /// No icon; carries a warning for the status report.
    Skipped(String),
}

/// Maps a declared image content type to a file extension.
pub fn extension_for_content_type(content_type: &str) -> Result<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => Ok("png"),
        "image/gif" => Ok("gif"),
        "image/x-icon" | "image/vnd.microsoft.icon" | "image/ico" | "image/icon"
        | "image/x-ico" | "text/ico" | "application/ico" => Ok("ico"),
        other => Err(ConvertError::UnsupportedImageType(other.to_string())),
    }
}

/// Writes or references the icon for a bundle.
///
/// Re-running overwrites `favicon.<ext>` with identical content.
pub async fn materialize(
    icon: &IconRef,
    output_dir: &Path,
    resource_base_dir: &Path,
) -> Result<IconOutcome> {
    match icon {
        IconRef::Remote(url) => Ok(IconOutcome::RemoteUrl(url.clone())),
        IconRef::Inline {
            content_type,
            bytes,
        } => {
            let ext = extension_for_content_type(content_type)?;
            let file_name = format!("{}.{}", ICON_STEM, ext);
            tokio::fs::write(output_dir.join(&file_name), bytes).await?;
            debug!("Wrote inline icon {} ({} bytes)", file_name, bytes.len());
            Ok(IconOutcome::File(file_name))
        }
        IconRef::Resource(relative) => {
            let relative_path = Path::new(relative);
            if relative_path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
            {
                return Ok(IconOutcome::Skipped(format!(
                    "icon resource escapes resource directory: {}",
                    relative
                )));
            }
            let Some(ext) = relative_path.extension().and_then(|e| e.to_str()) else {
                return Ok(IconOutcome::Skipped(format!(
                    "icon resource has no extension: {}",
                    relative
                )));
            };
            let file_name = format!("{}.{}", ICON_STEM, ext.to_ascii_lowercase());
            let source = resource_base_dir.join(relative_path);
            if let Err(e) = tokio::fs::copy(&source, output_dir.join(&file_name)).await {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Ok(IconOutcome::Skipped(format!(
                        "icon resource not found: {}",
                        source.display()
                    )));
                }
                return Err(e.into());
            }
            debug!("Copied icon {} to {}", source.display(), file_name);
            Ok(IconOutcome::File(file_name))
        }
        IconRef::Unrecognized(raw) => {
            let shown: String = raw.chars().take(60).collect();
            Ok(IconOutcome::Skipped(format!(
                "unrecognized icon reference: {}",
                shown
            )))
        }
    }
}
