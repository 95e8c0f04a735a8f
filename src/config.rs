//! Converter configuration and built-in data tables.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ConvertError, Result};

/// Locales a descriptor file name may declare.
pub const KNOWN_LOCALES: &[&str] = &[
    "ach", "af", "an", "ar", "as", "ast", "az", "be", "bg", "bn", "bn_BD", "bn_IN", "br", "bs",
    "ca", "cak", "cs", "cy", "da", "de", "dsb", "el", "en", "en_CA", "en_GB", "en_US", "en_ZA",
    "eo", "es", "es_AR", "es_CL", "es_ES", "es_MX", "et", "eu", "fa", "ff", "fi", "fr", "fy_NL",
    "ga_IE", "gd", "gl", "gn", "gu_IN", "he", "hi_IN", "hr", "hsb", "hu", "hy_AM", "ia", "id",
    "is", "it", "ja", "ka", "kab", "kk", "km", "kn", "ko", "lij", "lo", "lt", "ltg", "lv", "mai",
    "mk", "ml", "mr", "ms", "my", "nb_NO", "ne_NP", "nl", "nn_NO", "oc", "or", "pa_IN", "pl",
    "pt_BR", "pt_PT", "rm", "ro", "ru", "si", "sk", "sl", "son", "sq", "sr", "sv_SE", "ta", "te",
    "th", "tr", "uk", "ur", "uz", "vi", "wo", "xh", "zh_CN", "zh_TW",
];

/// File names whose hyphen suffix is not (or not exactly) a locale.
pub const LOCALE_OVERRIDES: &[(&str, &str)] = &[
    ("bbc-alba.xml", "gd_GB"),
    ("amazon-jp.xml", "ja"),
    ("yahoo-jp.xml", "ja"),
    ("amazon-au.xml", "en_AU"),
    ("google-2018.xml", "en"),
    ("mercadolibre-ar.xml", "es_AR"),
    ("mercadolibre-cl.xml", "es_CL"),
    ("mercadolibre-mx.xml", "es_MX"),
];

/// Suffix appended to the engine identity to form the extension id.
pub const DEFAULT_ID_SUFFIX: &str = "search.mozilla.org";

fn default_engine_overrides() -> BTreeMap<String, Value> {
    let mut overrides = BTreeMap::new();
    overrides.insert(
        "amazon".to_string(),
        json!({ "applications": { "gecko": { "id": "amazondotcom@search.mozilla.org" } } }),
    );
    overrides.insert(
        "google".to_string(),
        json!({ "chrome_settings_overrides": { "search_provider": { "is_default": true } } }),
    );
    overrides.insert(
        "wikipedia".to_string(),
        json!({ "chrome_settings_overrides": { "search_provider": { "keyword": "@wikipedia" } } }),
    );
    overrides
}

fn default_known_locales() -> BTreeSet<String> {
    KNOWN_LOCALES.iter().map(|l| l.to_string()).collect()
}

fn default_locale_overrides() -> BTreeMap<String, String> {
    LOCALE_OVERRIDES
        .iter()
        .map(|(file, tag)| (file.to_string(), tag.to_string()))
        .collect()
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_id_suffix() -> String {
    DEFAULT_ID_SUFFIX.to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Configuration for a conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Directory holding descriptor files, relative to the source root.
    #[serde(default = "default_dir")]
    pub descriptor_dir: PathBuf,
    /// Directory icon resources are resolved against, relative to the source root.
    #[serde(default = "default_dir")]
    pub resource_dir: PathBuf,
    /// Suffix of the generated extension id (`<engine>@<suffix>`).
    #[serde(default = "default_id_suffix")]
    pub id_suffix: String,
    /// Version written into every manifest.
    #[serde(default = "default_version")]
    pub extension_version: String,
    #[serde(default = "default_known_locales")]
    pub known_locales: BTreeSet<String>,
    /// File name to locale tag.
    #[serde(default = "default_locale_overrides")]
    pub locale_overrides: BTreeMap<String, String>,
    /// Engine identity to a manifest overlay object.
    #[serde(default = "default_engine_overrides")]
    pub engine_overrides: BTreeMap<String, Value>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            descriptor_dir: default_dir(),
            resource_dir: default_dir(),
            id_suffix: default_id_suffix(),
            extension_version: default_version(),
            known_locales: default_known_locales(),
            locale_overrides: default_locale_overrides(),
            engine_overrides: default_engine_overrides(),
        }
    }
}

/// On-disk configuration; tables extend the built-in ones.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    descriptor_dir: Option<PathBuf>,
    resource_dir: Option<PathBuf>,
    id_suffix: Option<String>,
    extension_version: Option<String>,
    known_locales: Vec<String>,
    locale_overrides: BTreeMap<String, String>,
    engine_overrides: BTreeMap<String, Value>,
}

impl ConverterConfig {
    /// Creates the built-in configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from JSON, layered over the built-in defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(text).map_err(|e| ConvertError::Config(e.to_string()))?;

        let mut config = Self::default();
        if let Some(dir) = file.descriptor_dir {
            config.descriptor_dir = dir;
        }
        if let Some(dir) = file.resource_dir {
            config.resource_dir = dir;
        }
        if let Some(suffix) = file.id_suffix {
            config = config.with_id_suffix(suffix);
        }
        if let Some(version) = file.extension_version {
            config.extension_version = version;
        }
        config.known_locales.extend(file.known_locales);
        config.locale_overrides.extend(file.locale_overrides);
        for (engine, overlay) in file.engine_overrides {
            config = config.with_engine_override(engine, overlay)?;
        }
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Sets the extension id suffix.
    pub fn with_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.id_suffix = suffix.into();
        self
    }

    /// Adds or replaces a file name to locale mapping.
    pub fn with_locale_override(mut self, file: impl Into<String>, tag: impl Into<String>) -> Self {
        self.locale_overrides.insert(file.into(), tag.into());
        self
    }

    /// Adds or replaces an engine's manifest overlay. The overlay must be an object.
    pub fn with_engine_override(
        mut self,
        engine: impl Into<String>,
        overlay: Value,
    ) -> Result<Self> {
        let engine = engine.into();
        if !overlay.is_object() {
            return Err(ConvertError::Config(format!(
                "override for '{}' must be a JSON object",
                engine
            )));
        }
        self.engine_overrides.insert(engine, overlay);
        Ok(self)
    }

    /// Returns the manifest overlay for an engine, if any.
    pub fn engine_override(&self, engine_id: &str) -> Option<&Value> {
        self.engine_overrides.get(engine_id)
    }
}
