//! Endpoint resolution: turns descriptor `<Url>` entries into concrete URLs.

use serde::{Deserialize, Serialize};

use crate::descriptor::{EndpointDef, Method, Param, SearchDescriptor, VendorParam};
use crate::{ConvertError, Result};

/// A fully resolved search or suggestion URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    /// Secure URL; for GET endpoints the encoded parameters are appended.
    pub url: String,
    /// Encoded GET parameters, if any were declared.
    pub query_string: Option<String>,
    /// Encoded POST parameters, if any were declared.
    pub post_body: Option<String>,
    /// Vendor parameters, never merged into the query string.
    pub vendor_params: Vec<VendorParam>,
}

/// Resolves the primary search endpoint.
pub fn resolve_primary(descriptor: &SearchDescriptor) -> Result<ResolvedUrl> {
    descriptor
        .primary_endpoint()
        .map(resolve_endpoint)
        .ok_or_else(|| ConvertError::MalformedInput("missing search Url".into()))
}

/// Resolves the suggestion endpoint, if the descriptor declares one.
pub fn resolve_suggestion(descriptor: &SearchDescriptor) -> Option<ResolvedUrl> {
    descriptor.suggestion_endpoint().map(resolve_endpoint)
}

/// Resolves a single endpoint definition.
pub fn resolve_endpoint(endpoint: &EndpointDef) -> ResolvedUrl {
    let mut url = secure_scheme(&endpoint.url_template);
    let encoded = encode_params(&endpoint.params);

    let (query_string, post_body) = match (endpoint.method, encoded) {
        (_, None) => (None, None),
        (Method::Get, Some(query)) => {
            append_query(&mut url, &query);
            (Some(query), None)
        }
        (Method::Post, Some(body)) => (None, Some(body)),
    };

    ResolvedUrl {
        url,
        query_string,
        post_body,
        vendor_params: endpoint.vendor_params.clone(),
    }
}

/// Rewrites a leading `http:` scheme to `https:`.
pub fn secure_scheme(template: &str) -> String {
    match template.get(..5) {
        Some(scheme) if scheme.eq_ignore_ascii_case("http:") => {
            format!("https:{}", &template[5..])
        }
        _ => template.to_string(),
    }
}

/// Joins parameters as `name=value&...` in declaration order.
///
/// Values are kept verbatim so template placeholders survive.
pub fn encode_params(params: &[Param]) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    Some(
        params
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

/// Appends an encoded query, choosing the separator from the current URL.
pub fn append_query(url: &mut String, query: &str) {
    if !url.contains('?') {
        url.push('?');
    } else if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }
    url.push_str(query);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SUGGESTION_TYPE;

    fn endpoint(template: &str, method: Method) -> EndpointDef {
        EndpointDef {
            url_template: template.to_string(),
            endpoint_type: "text/html".to_string(),
            method,
            params: vec![Param::new("q", "{searchTerms}"), Param::new("format", "json")],
            vendor_params: Vec::new(),
        }
    }

    fn descriptor(endpoints: Vec<EndpointDef>) -> SearchDescriptor {
        SearchDescriptor {
            short_name: "Test".to_string(),
            description: "Test engine".to_string(),
            image: None,
            endpoints,
            search_form: None,
            input_encoding: None,
        }
    }

    #[test]
    fn test_get_encoding() {
        let resolved = resolve_endpoint(&endpoint("https://x.test/search", Method::Get));
        assert_eq!(resolved.url, "https://x.test/search?q={searchTerms}&format=json");
        assert_eq!(resolved.query_string.as_deref(), Some("q={searchTerms}&format=json"));
        assert!(resolved.post_body.is_none());
    }

    #[test]
    fn test_get_encoding_with_existing_query() {
        let resolved = resolve_endpoint(&endpoint("https://x.test/search?x=1", Method::Get));
        assert_eq!(
            resolved.url,
            "https://x.test/search?x=1&q={searchTerms}&format=json"
        );
        assert_eq!(resolved.url.matches('?').count(), 1);
    }

    #[test]
    fn test_get_encoding_with_trailing_separator() {
        let resolved = resolve_endpoint(&endpoint("https://x.test/search?", Method::Get));
        assert_eq!(resolved.url, "https://x.test/search?q={searchTerms}&format=json");
    }

    #[test]
    fn test_post_encoding() {
        let resolved = resolve_endpoint(&endpoint("https://x.test/search", Method::Post));
        assert_eq!(resolved.url, "https://x.test/search");
        assert_eq!(resolved.post_body.as_deref(), Some("q={searchTerms}&format=json"));
        assert!(resolved.query_string.is_none());
    }

    #[test]
    fn test_no_params() {
        let mut ep = endpoint("http://x.test/search?q={searchTerms}", Method::Get);
        ep.params.clear();
        let resolved = resolve_endpoint(&ep);
        assert_eq!(resolved.url, "https://x.test/search?q={searchTerms}");
        assert!(resolved.query_string.is_none());
        assert!(resolved.post_body.is_none());
    }

    #[test]
    fn test_secure_scheme() {
        assert_eq!(secure_scheme("http://x.test/"), "https://x.test/");
        assert_eq!(secure_scheme("HTTP://x.test/"), "https://x.test/");
        assert_eq!(secure_scheme("https://x.test/"), "https://x.test/");
        assert_eq!(
            secure_scheme("https://x.test/?u=http://y.test"),
            "https://x.test/?u=http://y.test"
        );
        assert_eq!(secure_scheme("ftp"), "ftp");
    }

    #[test]
    fn test_scheme_normalized_for_post() {
        let resolved = resolve_endpoint(&endpoint("http://x.test/search", Method::Post));
        assert_eq!(resolved.url, "https://x.test/search");
    }

    #[test]
    fn test_post_keeps_vendor_params() {
        let mut ep = endpoint("https://x.test/search", Method::Post);
        ep.vendor_params = vec![
            VendorParam::new("client", "firefox").with_purpose("searchbar"),
            VendorParam::new("channel", "fs"),
        ];
        let resolved = resolve_endpoint(&ep);
        assert_eq!(resolved.vendor_params.len(), 2);
        assert_eq!(resolved.vendor_params[0].purpose.as_deref(), Some("searchbar"));
        assert!(!resolved.post_body.unwrap().contains("client"));
        assert!(!resolved.url.contains("client"));
    }

    #[test]
    fn test_resolve_primary_is_pure() {
        let d = descriptor(vec![endpoint("http://x.test/search", Method::Get)]);
        assert_eq!(resolve_primary(&d).unwrap(), resolve_primary(&d).unwrap());
    }

    #[test]
    fn test_primary_and_suggestion_selection() {
        let mut suggest = endpoint("https://x.test/suggest", Method::Get);
        suggest.endpoint_type = SUGGESTION_TYPE.to_string();
        let mut second_suggest = suggest.clone();
        second_suggest.url_template = "https://x.test/other".to_string();
        let d = descriptor(vec![
            suggest,
            endpoint("https://x.test/first", Method::Get),
            endpoint("https://x.test/second", Method::Get),
            second_suggest,
        ]);

        let primary = resolve_primary(&d).unwrap();
        assert!(primary.url.starts_with("https://x.test/first?"));
        let suggestion = resolve_suggestion(&d).unwrap();
        assert!(suggestion.url.starts_with("https://x.test/suggest?"));
    }

    #[test]
    fn test_primary_missing() {
        let mut suggest = endpoint("https://x.test/suggest", Method::Get);
        suggest.endpoint_type = SUGGESTION_TYPE.to_string();
        let d = descriptor(vec![suggest]);
        assert!(matches!(
            resolve_primary(&d),
            Err(ConvertError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_no_suggestion() {
        let d = descriptor(vec![endpoint("https://x.test/search", Method::Get)]);
        assert!(resolve_suggestion(&d).is_none());
    }

    #[test]
    fn test_encode_params_empty() {
        assert!(encode_params(&[]).is_none());
    }
}
