//! Search descriptor parsing.
//!
//! Handles both OpenSearch (`<OpenSearchDescription>`) and legacy Mozilla
//! (`<SearchPlugin>`) documents. Element names are matched on their local
//! part, so `os:` and `moz:` prefixes are accepted interchangeably.

use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ConvertError, Result};

/// MIME type marking a suggestion endpoint.
pub const SUGGESTION_TYPE: &str = "application/x-suggestions+json";

/// Opening of either supported root element, optionally namespace-prefixed.
static ROOT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z_][\w.-]*:)?(?:OpenSearchDescription|SearchPlugin)\b")
        .expect("root marker regex is valid")
});

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("post") {
            Method::Post
        } else {
            Method::Get
        }
    }
}

/// A standard `name=value` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An engine-specific extension parameter, carried through opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorParam {
    pub name: String,
    pub value: String,
    /// Optional tag describing where the request originated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl VendorParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            purpose: None,
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }
}

/// One `<Url>` element of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointDef {
    /// URL template, placeholders such as `{searchTerms}` kept verbatim.
    pub url_template: String,
    /// Declared response type (e.g. `text/html`).
    pub endpoint_type: String,
    pub method: Method,
    pub params: Vec<Param>,
    pub vendor_params: Vec<VendorParam>,
}

impl EndpointDef {
    /// Returns true if this endpoint serves search suggestions.
    pub fn is_suggestion(&self) -> bool {
        self.endpoint_type == SUGGESTION_TYPE
    }
}

/// Where a descriptor's icon comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRef {
    /// Remote URL, used as-is.
    Remote(String),
    /// Inline `data:` image.
    Inline { content_type: String, bytes: Vec<u8> },
    /// Path relative to the icon resource directory.
    Resource(String),
    /// Anything else; surfaced as a warning during materialization.
    Unrecognized(String),
}

impl IconRef {
    /// Classifies the text content of an `<Image>` element.
    pub fn from_image_text(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return match url::Url::parse(raw) {
                Ok(_) => IconRef::Remote(raw.to_string()),
                Err(_) => IconRef::Unrecognized(raw.to_string()),
            };
        }

        if lower.starts_with("data:") {
            return parse_data_url(raw).unwrap_or_else(|| IconRef::Unrecognized(raw.to_string()));
        }

        if lower.starts_with("resource://") || lower.starts_with("chrome://") {
            return match url::Url::parse(raw) {
                Ok(parsed) => {
                    let path = parsed.path().trim_start_matches('/');
                    if path.is_empty() {
                        IconRef::Unrecognized(raw.to_string())
                    } else {
                        IconRef::Resource(path.to_string())
                    }
                }
                Err(_) => IconRef::Unrecognized(raw.to_string()),
            };
        }

        if !raw.is_empty() && !raw.contains(':') && !raw.contains(char::is_whitespace) {
            return IconRef::Resource(raw.trim_start_matches("./").to_string());
        }

        IconRef::Unrecognized(raw.to_string())
    }
}

fn parse_data_url(raw: &str) -> Option<IconRef> {
    let rest = &raw["data:".len()..];
    let (meta, payload) = rest.split_once(',')?;

    let mut parts = meta.split(';');
    let content_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let is_base64 = parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        match BASE64.decode(&cleaned) {
            Ok(bytes) => bytes,
            // Some descriptors percent-encode the padding.
            Err(_) => {
                let decoded = urlencoding::decode(&cleaned).ok()?;
                BASE64.decode(decoded.as_bytes()).ok()?
            }
        }
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    Some(IconRef::Inline {
        content_type,
        bytes,
    })
}

/// Parsed representation of one descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDescriptor {
    pub short_name: String,
    pub description: String,
    pub image: Option<IconRef>,
    pub endpoints: Vec<EndpointDef>,
    /// Landing page for an empty search.
    pub search_form: Option<String>,
    pub input_encoding: Option<String>,
}

impl SearchDescriptor {
    /// First endpoint that is not a suggestion endpoint.
    pub fn primary_endpoint(&self) -> Option<&EndpointDef> {
        self.endpoints.iter().find(|e| !e.is_suggestion())
    }

    /// First suggestion endpoint, if any.
    pub fn suggestion_endpoint(&self) -> Option<&EndpointDef> {
        self.endpoints.iter().find(|e| e.is_suggestion())
    }
}

/// Locates the root element, skipping any BOM, prolog or stray text before it.
pub fn find_root(text: &str) -> Option<usize> {
    ROOT_MARKER.find(text).map(|m| m.start())
}

/// Parses raw descriptor text.
pub fn parse_descriptor(text: &str) -> Result<SearchDescriptor> {
    let start = find_root(text).ok_or_else(|| {
        ConvertError::MalformedInput("no OpenSearchDescription or SearchPlugin element".into())
    })?;

    let mut reader = Reader::from_str(&text[start..]);

    let mut builder = DescriptorBuilder::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current_url: Option<EndpointDef> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                text_buf.clear();
                builder.open(&name, &e, stack.len(), &mut current_url)?;
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                builder.open(&name, &e, stack.len(), &mut current_url)?;
                if name == "Url" {
                    if let Some(endpoint) = current_url.take() {
                        builder.endpoints.push(endpoint);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ConvertError::MalformedInput(format!("bad text: {}", e)))?;
                text_buf.push_str(&chunk);
            }
            Ok(Event::CData(c)) => {
                text_buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                if name == "Url" {
                    if let Some(endpoint) = current_url.take() {
                        builder.endpoints.push(endpoint);
                    }
                } else if stack.len() == 1 {
                    builder.close_field(&name, text_buf.trim());
                }
                text_buf.clear();
                if stack.is_empty() {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConvertError::MalformedInput(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    builder.finish()
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr =
            attr.map_err(|err| ConvertError::MalformedInput(format!("bad attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ConvertError::MalformedInput(format!("bad attribute value: {}", err)))?;
        attrs.push((key, value.into_owned()));
    }
    Ok(attrs)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Default)]
struct DescriptorBuilder {
    short_name: Option<String>,
    description: Option<String>,
    image: Option<IconRef>,
    search_form: Option<String>,
    input_encoding: Option<String>,
    endpoints: Vec<EndpointDef>,
}

impl DescriptorBuilder {
    /// Handles an opening (or self-closing) element at the given depth.
    fn open(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        depth: usize,
        current_url: &mut Option<EndpointDef>,
    ) -> Result<()> {
        match name {
            "Url" if depth == 1 => {
                let attrs = attributes(e)?;
                *current_url = Some(EndpointDef {
                    url_template: attr(&attrs, "template").unwrap_or_default().to_string(),
                    endpoint_type: attr(&attrs, "type").unwrap_or_default().trim().to_string(),
                    method: attr(&attrs, "method").map(Method::parse).unwrap_or_default(),
                    params: Vec::new(),
                    vendor_params: Vec::new(),
                });
            }
            "Param" | "MozParam" => {
                let Some(endpoint) = current_url.as_mut() else {
                    return Ok(());
                };
                let attrs = attributes(e)?;
                let (Some(pname), Some(value)) = (attr(&attrs, "name"), attr(&attrs, "value"))
                else {
                    debug!("Skipping {} without name/value", name);
                    return Ok(());
                };
                if name == "Param" {
                    endpoint.params.push(Param::new(pname, value));
                } else {
                    let mut param = VendorParam::new(pname, value);
                    if let Some(purpose) = attr(&attrs, "purpose") {
                        param = param.with_purpose(purpose);
                    }
                    endpoint.vendor_params.push(param);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Records the text of a direct child of the root element.
    fn close_field(&mut self, name: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let slot = match name {
            "ShortName" => &mut self.short_name,
            "Description" => &mut self.description,
            "SearchForm" => &mut self.search_form,
            "InputEncoding" => &mut self.input_encoding,
            "Image" => {
                if self.image.is_none() {
                    self.image = Some(IconRef::from_image_text(text));
                }
                return;
            }
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }

    fn finish(self) -> Result<SearchDescriptor> {
        let short_name = self
            .short_name
            .ok_or_else(|| ConvertError::MalformedInput("missing ShortName".into()))?;
        let description = self
            .description
            .ok_or_else(|| ConvertError::MalformedInput("missing Description".into()))?;
        let descriptor = SearchDescriptor {
            short_name,
            description,
            image: self.image,
            endpoints: self.endpoints,
            search_form: self.search_form,
            input_encoding: self.input_encoding,
        };
        if descriptor.primary_endpoint().is_none() {
            return Err(ConvertError::MalformedInput("missing search Url".into()));
        }
        Ok(descriptor)
    }
}
