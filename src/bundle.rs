//! Bundle composition: merges one engine's descriptors into a manifest
//! and a set of per-locale message catalogs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::ConverterConfig;
use crate::descriptor::{parse_descriptor, IconRef, SearchDescriptor};
use crate::endpoint::{resolve_primary, resolve_suggestion, ResolvedUrl};
use crate::icon::IconOutcome;
use crate::locale::{resolve_locale, FALLBACK_LOCALE};
use crate::manifest::{
    base_manifest, merge, message_ref, message_refs, EXTENSION_DESCRIPTION, EXTENSION_NAME,
};
use crate::{ConvertError, Result};

/// Raw contents of one descriptor file.
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    /// File name (or path) the locale is derived from.
    pub file_name: String,
    pub contents: String,
}

impl DescriptorSource {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Per-locale mapping of message keys to literal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageCatalog(BTreeMap<String, Message>);

impl MessageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.insert(
            key.into(),
            Message {
                message: message.into(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|m| m.message.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Search provider fields whose values may differ between locales.
///
/// Each entry is `(manifest field, catalog key)`.
const LOCALIZED_FIELDS: &[(&str, &str)] = &[
    ("search_url", "searchUrl"),
    ("search_form", "searchForm"),
    ("suggest_url", "suggestUrl"),
    ("search_url_post_params", "searchUrlPostParams"),
    ("suggest_url_post_params", "suggestUrlPostParams"),
];

/// One successfully parsed locale file.
struct LocaleEntry {
    locale: String,
    descriptor: SearchDescriptor,
    primary: ResolvedUrl,
    suggestion: Option<ResolvedUrl>,
}

impl LocaleEntry {
    fn localized_value(&self, catalog_key: &str) -> Option<&str> {
        match catalog_key {
            "searchUrl" => Some(self.primary.url.as_str()),
            "searchForm" => self.descriptor.search_form.as_deref(),
            "suggestUrl" => self.suggestion.as_ref().map(|s| s.url.as_str()),
            "searchUrlPostParams" => self.primary.post_body.as_deref(),
            "suggestUrlPostParams" => self
                .suggestion
                .as_ref()
                .and_then(|s| s.post_body.as_deref()),
            _ => None,
        }
    }
}

/// The composed, locale-aware output for one engine identity.
#[derive(Debug, Clone)]
pub struct EngineBundle {
    engine_id: String,
    version: String,
    computed: Value,
    overlay: Option<Value>,
    locales: BTreeMap<String, MessageCatalog>,
    locale_order: Vec<String>,
    default_locale: String,
    icon: Option<IconRef>,
    has_suggestions: bool,
    warnings: Vec<String>,
}

impl EngineBundle {
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Final manifest: base template, then computed fields, then overrides.
    pub fn manifest(&self) -> Value {
        let manifest = merge(&base_manifest(&self.version), &self.computed);
        match &self.overlay {
            Some(overlay) => merge(&manifest, overlay),
            None => manifest,
        }
    }

    pub fn locales(&self) -> &BTreeMap<String, MessageCatalog> {
        &self.locales
    }

    /// Locale tags in file-processing order.
    pub fn locale_order(&self) -> &[String] {
        &self.locale_order
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Icon reference taken from the representative file.
    pub fn icon(&self) -> Option<&IconRef> {
        self.icon.as_ref()
    }

    pub fn has_suggestions(&self) -> bool {
        self.has_suggestions
    }

    /// Non-fatal problems met while composing.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns a bundle whose manifest carries the materialized icon.
    pub fn with_icon(mut self, outcome: &IconOutcome) -> Self {
        match outcome {
            IconOutcome::File(file) => {
                self.computed = merge(
                    &self.computed,
                    &json!({
                        "icons": { "16": file },
                        "web_accessible_resources": [file],
                    }),
                );
            }
            IconOutcome::RemoteUrl(url) => {
                self.computed = merge(
                    &self.computed,
                    &json!({
                        "chrome_settings_overrides": { "search_provider": { "favicon_url": url } }
                    }),
                );
            }
            IconOutcome::Skipped(reason) => {
                self.warnings.push(reason.clone());
            }
        }
        self
    }

    /// Returns a bundle with an extra warning recorded.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Checks that the default locale and every message reference resolve.
    pub fn check_references(&self) -> Result<()> {
        let manifest = self.manifest();
        let default_locale = manifest["default_locale"].as_str().unwrap_or_default();
        if !self.locales.contains_key(default_locale) {
            return Err(ConvertError::MalformedInput(format!(
                "default locale '{}' has no catalog",
                default_locale
            )));
        }
        for key in message_refs(&manifest) {
            if let Some((tag, _)) = self.locales.iter().find(|(_, c)| !c.contains(&key)) {
                return Err(ConvertError::MalformedInput(format!(
                    "message '{}' missing from locale '{}'",
                    key, tag
                )));
            }
        }
        Ok(())
    }
}

/// Composes the bundle for one engine from its descriptor files.
///
/// Files that fail to parse are dropped with a warning; if none survive the
/// engine is reported as having no input files.
pub fn compose(
    engine_id: &str,
    files: &[DescriptorSource],
    config: &ConverterConfig,
) -> Result<EngineBundle> {
    if files.is_empty() {
        return Err(ConvertError::NoInputFiles(engine_id.to_string()));
    }

    let mut warnings = Vec::new();
    let mut entries: Vec<LocaleEntry> = Vec::new();

    for file in files {
        let descriptor = match parse_descriptor(&file.contents) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Skipping {}: {}", file.file_name, e);
                warnings.push(format!("{}: {}", file.file_name, e));
                continue;
            }
        };

        let locale = resolve_locale(
            &file.file_name,
            &config.locale_overrides,
            &config.known_locales,
        );
        if entries.iter().any(|e| e.locale == locale) {
            warn!(
                "Skipping {}: locale '{}' already provided",
                file.file_name, locale
            );
            warnings.push(format!(
                "{}: duplicate locale '{}'",
                file.file_name, locale
            ));
            continue;
        }

        let primary = match resolve_primary(&descriptor) {
            Ok(primary) => primary,
            Err(e) => {
                warn!("Skipping {}: {}", file.file_name, e);
                warnings.push(format!("{}: {}", file.file_name, e));
                continue;
            }
        };
        let suggestion = resolve_suggestion(&descriptor);

        debug!("Parsed {} as locale '{}'", file.file_name, locale);
        entries.push(LocaleEntry {
            locale,
            descriptor,
            primary,
            suggestion,
        });
    }

    let Some(representative) = entries.first() else {
        return Err(ConvertError::NoInputFiles(engine_id.to_string()));
    };

    let multi_locale = entries.len() > 1;
    let has_suggestions = entries.iter().any(|e| e.suggestion.is_some());

    let mut locales = BTreeMap::new();
    for entry in &entries {
        let mut catalog = MessageCatalog::new();
        catalog.insert(EXTENSION_NAME, entry.descriptor.short_name.clone());
        catalog.insert(EXTENSION_DESCRIPTION, entry.descriptor.description.clone());
        locales.insert(entry.locale.clone(), catalog);
    }

    let mut provider = Map::new();
    provider.insert(
        "name".to_string(),
        Value::String(if multi_locale {
            message_ref(EXTENSION_NAME)
        } else {
            representative.descriptor.short_name.clone()
        }),
    );

    for (field, key) in LOCALIZED_FIELDS {
        if !entries.iter().any(|e| e.localized_value(key).is_some()) {
            continue;
        }
        if multi_locale {
            provider.insert(field.to_string(), Value::String(message_ref(key)));
            for entry in &entries {
                let value = entry.localized_value(key).unwrap_or_default();
                if let Some(catalog) = locales.get_mut(&entry.locale) {
                    catalog.insert(*key, value);
                }
            }
        } else if let Some(value) = representative.localized_value(key) {
            provider.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    if !representative.primary.vendor_params.is_empty() {
        provider.insert(
            "params".to_string(),
            serde_json::to_value(&representative.primary.vendor_params)?,
        );
    }

    if let Some(encoding) = &representative.descriptor.input_encoding {
        if !encoding.eq_ignore_ascii_case("utf-8") {
            provider.insert("encoding".to_string(), Value::String(encoding.clone()));
        }
    }

    let locale_order: Vec<String> = entries.iter().map(|e| e.locale.clone()).collect();
    let default_locale = if locale_order.iter().any(|l| l == FALLBACK_LOCALE) {
        FALLBACK_LOCALE.to_string()
    } else {
        representative.locale.clone()
    };

    let computed = json!({
        "applications": { "gecko": { "id": format!("{}@{}", engine_id, config.id_suffix) } },
        "default_locale": default_locale,
        "chrome_settings_overrides": { "search_provider": Value::Object(provider) },
    });

    Ok(EngineBundle {
        engine_id: engine_id.to_string(),
        version: config.extension_version.clone(),
        computed,
        overlay: config.engine_override(engine_id).cloned(),
        locales,
        locale_order,
        default_locale,
        icon: representative.descriptor.image.clone(),
        has_suggestions,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_xml(name: &str, template: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<SearchPlugin xmlns="http://www.mozilla.org/2006/browser/search/">
  <ShortName>{name}</ShortName>
  <Description>{name} Search</Description>
  <Image width="16" height="16">data:image/png;base64,aGVsbG8=</Image>
  <Url type="text/html" method="GET" template="{template}">
    <Param name="q" value="{{searchTerms}}"/>
    <MozParam name="client" value="firefox" purpose="searchbar"/>
  </Url>
</SearchPlugin>"#
        )
    }

    fn with_suggest(xml: &str, template: &str) -> String {
        xml.replace(
            "</SearchPlugin>",
            &format!(
                r#"<Url type="application/x-suggestions+json" template="{template}"/></SearchPlugin>"#
            ),
        )
    }

    fn config() -> ConverterConfig {
        let mut config = ConverterConfig::default();
        config.engine_overrides.clear();
        config
    }

    #[test]
    fn test_compose_single_locale_uses_literals() {
        let files = vec![DescriptorSource::new(
            "example.xml",
            descriptor_xml("Example", "http://example.test/search"),
        )];
        let bundle = compose("example", &files, &config()).unwrap();
        let manifest = bundle.manifest();

        assert_eq!(bundle.locales().len(), 1);
        assert_eq!(bundle.default_locale(), "en");
        assert_eq!(manifest["default_locale"], "en");
        assert_eq!(manifest["applications"]["gecko"]["id"], "example@search.mozilla.org");
        assert_eq!(manifest["name"], "__MSG_extensionName__");
        assert_eq!(manifest["manifest_version"], 2);

        let provider = &manifest["chrome_settings_overrides"]["search_provider"];
        assert_eq!(provider["name"], "Example");
        assert_eq!(provider["search_url"], "https://example.test/search?q={searchTerms}");
        assert!(provider.get("suggest_url").is_none());
        assert_eq!(provider["params"][0]["name"], "client");
        assert_eq!(provider["params"][0]["purpose"], "searchbar");

        let catalog = &bundle.locales()["en"];
        assert_eq!(catalog.get("extensionName"), Some("Example"));
        assert_eq!(catalog.get("extensionDescription"), Some("Example Search"));
        assert!(!catalog.contains("searchUrl"));
        assert!(bundle.check_references().is_ok());
        assert!(bundle.warnings().is_empty());
    }

    #[test]
    fn test_compose_multi_locale_uses_references() {
        let files = vec![
            DescriptorSource::new(
                "wiki-fr.xml",
                descriptor_xml("Wikipédia", "https://fr.wiki.test/s"),
            ),
            DescriptorSource::new(
                "wiki-en_GB.xml",
                with_suggest(
                    &descriptor_xml("Wikipedia", "https://en.wiki.test/s"),
                    "https://en.wiki.test/suggest?q={searchTerms}",
                ),
            ),
            DescriptorSource::new(
                "wiki-de.xml",
                descriptor_xml("Wikipedia", "https://de.wiki.test/s"),
            ),
        ];
        let bundle = compose("wiki", &files, &config()).unwrap();
        let manifest = bundle.manifest();
        let provider = &manifest["chrome_settings_overrides"]["search_provider"];

        assert_eq!(bundle.locale_order(), &["fr", "en_GB", "de"]);
        assert_eq!(bundle.default_locale(), "fr");
        assert!(bundle.has_suggestions());
        assert_eq!(provider["name"], "__MSG_extensionName__");
        assert_eq!(provider["search_url"], "__MSG_searchUrl__");
        assert_eq!(provider["suggest_url"], "__MSG_suggestUrl__");

        let fr = &bundle.locales()["fr"];
        assert_eq!(fr.get("extensionName"), Some("Wikipédia"));
        assert_eq!(fr.get("searchUrl"), Some("https://fr.wiki.test/s?q={searchTerms}"));
        assert_eq!(fr.get("suggestUrl"), Some(""));
        assert_eq!(
            bundle.locales()["en_GB"].get("suggestUrl"),
            Some("https://en.wiki.test/suggest?q={searchTerms}")
        );
        assert!(bundle.check_references().is_ok());
    }

    #[test]
    fn test_default_locale_prefers_en() {
        let files = vec![
            DescriptorSource::new("x-fr.xml", descriptor_xml("X", "https://x.test/fr")),
            DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/en")),
            DescriptorSource::new("x-de.xml", descriptor_xml("X", "https://x.test/de")),
        ];
        let bundle = compose("x", &files, &config()).unwrap();
        assert_eq!(bundle.locale_order(), &["fr", "en", "de"]);
        assert_eq!(bundle.default_locale(), "en");
    }

    #[test]
    fn test_default_locale_first_when_no_en() {
        let files = vec![
            DescriptorSource::new("x-fr.xml", descriptor_xml("X", "https://x.test/fr")),
            DescriptorSource::new("x-de.xml", descriptor_xml("X", "https://x.test/de")),
        ];
        let bundle = compose("x", &files, &config()).unwrap();
        assert_eq!(bundle.default_locale(), "fr");
        assert_eq!(bundle.manifest()["default_locale"], "fr");
    }

    #[test]
    fn test_partial_failure_drops_one_locale() {
        let broken = r#"<SearchPlugin><ShortName>X</ShortName>
            <Url type="text/html" template="https://x.test/"/></SearchPlugin>"#;
        let files = vec![
            DescriptorSource::new("x-fr.xml", descriptor_xml("X", "https://x.test/fr")),
            DescriptorSource::new("x-de.xml", broken),
            DescriptorSource::new("x-it.xml", descriptor_xml("X", "https://x.test/it")),
        ];
        let bundle = compose("x", &files, &config()).unwrap();
        assert_eq!(bundle.locales().len(), 2);
        assert!(bundle.locales().contains_key("fr"));
        assert!(bundle.locales().contains_key("it"));
        assert_eq!(bundle.warnings().len(), 1);
        assert!(bundle.warnings()[0].contains("x-de.xml"));
    }

    #[test]
    fn test_all_files_broken() {
        let files = vec![DescriptorSource::new("x.xml", "<html/>")];
        let err = compose("x", &files, &config()).unwrap_err();
        assert!(matches!(err, ConvertError::NoInputFiles(ref id) if id == "x"));
    }

    #[test]
    fn test_no_files() {
        let err = compose("x", &[], &config()).unwrap_err();
        assert!(matches!(err, ConvertError::NoInputFiles(_)));
    }

    #[test]
    fn test_duplicate_locale_first_wins() {
        let files = vec![
            DescriptorSource::new("x.xml", descriptor_xml("First", "https://x.test/1")),
            DescriptorSource::new("x-zz.xml", descriptor_xml("Second", "https://x.test/2")),
        ];
        let bundle = compose("x", &files, &config()).unwrap();
        assert_eq!(bundle.locales().len(), 1);
        assert_eq!(bundle.locales()["en"].get("extensionName"), Some("First"));
        assert_eq!(bundle.warnings().len(), 1);
    }

    #[test]
    fn test_overrides_win_over_computed() {
        let config = config()
            .with_engine_override(
                "x",
                json!({
                    "applications": { "gecko": { "id": "custom@example.test" } },
                    "hidden": false
                }),
            )
            .unwrap();
        let files = vec![DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/"))];
        let manifest = compose("x", &files, &config).unwrap().manifest();
        assert_eq!(manifest["applications"]["gecko"]["id"], "custom@example.test");
        assert_eq!(manifest["hidden"], false);
        assert_eq!(manifest["version"], "1.0");
    }

    #[test]
    fn test_post_endpoint() {
        let xml = r#"<SearchPlugin><ShortName>P</ShortName><Description>Post</Description>
            <Url type="text/html" method="POST" template="http://p.test/search">
              <Param name="q" value="{searchTerms}"/>
              <MozParam name="src" value="ff"/>
            </Url></SearchPlugin>"#;
        let files = vec![DescriptorSource::new("p.xml", xml)];
        let manifest = compose("p", &files, &config()).unwrap().manifest();
        let provider = &manifest["chrome_settings_overrides"]["search_provider"];
        assert_eq!(provider["search_url"], "https://p.test/search");
        assert_eq!(provider["search_url_post_params"], "q={searchTerms}");
        assert_eq!(provider["params"][0]["value"], "ff");
        assert!(provider["params"][0].get("purpose").is_none());
    }

    #[test]
    fn test_non_utf8_encoding_kept() {
        let xml = descriptor_xml("E", "https://e.test/").replace(
            "<Image",
            "<InputEncoding>windows-1251</InputEncoding><Image",
        );
        let files = vec![DescriptorSource::new("e.xml", xml)];
        let manifest = compose("e", &files, &config()).unwrap().manifest();
        assert_eq!(
            manifest["chrome_settings_overrides"]["search_provider"]["encoding"],
            "windows-1251"
        );
    }

    #[test]
    fn test_with_icon_file() {
        let files = vec![DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/"))];
        let bundle = compose("x", &files, &config()).unwrap();
        assert!(matches!(bundle.icon(), Some(IconRef::Inline { .. })));

        let bundle = bundle.with_icon(&IconOutcome::File("favicon.png".to_string()));
        let manifest = bundle.manifest();
        assert_eq!(manifest["icons"]["16"], "favicon.png");
        assert_eq!(manifest["web_accessible_resources"][0], "favicon.png");
    }

    #[test]
    fn test_with_icon_remote_and_skipped() {
        let files = vec![DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/"))];
        let bundle = compose("x", &files, &config())
            .unwrap()
            .with_icon(&IconOutcome::RemoteUrl("https://x.test/f.ico".to_string()));
        assert_eq!(
            bundle.manifest()["chrome_settings_overrides"]["search_provider"]["favicon_url"],
            "https://x.test/f.ico"
        );

        let skipped = bundle.with_icon(&IconOutcome::Skipped("no icon".to_string()));
        assert_eq!(skipped.warnings(), &["no icon".to_string()]);
        assert!(skipped.manifest().get("icons").is_none());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let files = vec![
            DescriptorSource::new("x-fr.xml", descriptor_xml("X", "https://x.test/fr")),
            DescriptorSource::new("x-de.xml", descriptor_xml("X", "https://x.test/de")),
        ];
        let a = compose("x", &files, &config()).unwrap();
        let b = compose("x", &files, &config()).unwrap();
        assert_eq!(
            serde_json::to_string_pretty(&a.manifest()).unwrap(),
            serde_json::to_string_pretty(&b.manifest()).unwrap()
        );
        assert_eq!(a.locales(), b.locales());
    }

    #[test]
    fn test_check_references_detects_missing_message() {
        let config = config()
            .with_engine_override("x", json!({ "homepage_url": "__MSG_homepage__" }))
            .unwrap();
        let files = vec![DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/"))];
        let bundle = compose("x", &files, &config).unwrap();
        let err = bundle.check_references().unwrap_err();
        assert!(err.to_string().contains("homepage"));
    }

    #[test]
    fn test_check_references_detects_bad_default_locale() {
        let config = config()
            .with_engine_override("x", json!({ "default_locale": "ru" }))
            .unwrap();
        let files = vec![DescriptorSource::new("x.xml", descriptor_xml("X", "https://x.test/"))];
        let err = compose("x", &files, &config).unwrap().check_references().unwrap_err();
        assert!(err.to_string().contains("'ru'"));
    }

    #[test]
    fn test_catalog_serialization() {
        let mut catalog = MessageCatalog::new();
        catalog.insert("extensionName", "X");
        let json = serde_json::to_string(&catalog).unwrap();
        assert_eq!(json, r#"{"extensionName":{"message":"X"}}"#);
    }
}
