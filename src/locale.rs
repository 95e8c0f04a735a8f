//! Locale and engine identity derivation from descriptor file names.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Locale used when a file name carries no usable locale.
pub const FALLBACK_LOCALE: &str = "en";

/// Resolves the locale tag for a descriptor file.
///
/// `filename` may be a bare name or a path; only the final component is
/// considered. The override table is consulted first, then the text
/// between the first hyphen and the extension, which must be a known locale.
pub fn resolve_locale(
    filename: &str,
    overrides: &BTreeMap<String, String>,
    known: &BTreeSet<String>,
) -> String {
    let name = file_name(filename);

    if let Some(tag) = overrides.get(name) {
        return tag.clone();
    }

    let Some((_, rest)) = name.split_once('-') else {
        return FALLBACK_LOCALE.to_string();
    };
    let candidate = strip_extension(rest).replace('-', "_");

    if known.contains(&candidate) {
        candidate
    } else {
        FALLBACK_LOCALE.to_string()
    }
}

/// Derives the engine identity: the file stem up to the first hyphen.
pub fn engine_id(filename: &str) -> String {
    let stem = strip_extension(file_name(filename));
    match stem.split_once('-') {
        Some((prefix, _)) => prefix.to_string(),
        None => stem.to_string(),
    }
}

fn file_name(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}
