/*!
Header-set merging and extraction of typed transport headers.

Header names are compared case-insensitively. When the same name appears in
several layers, the later layer wins and its spelling of the name is kept.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-valued header slots as exchanged with the object store.
pub type HeaderSet = BTreeMap<String, String>;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LANGUAGE: &str = "Content-Language";

/// Headers ready to be handed to an upload call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedHeaders {
    /// Custom header slots, including the metadata slot
    pub metadata: HeaderSet,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
}

impl EncodedHeaders {
    /// Split a merged header set into typed transport headers and custom slots.
    pub fn from_merged(merged: HeaderSet) -> Self {
        let mut encoded = EncodedHeaders::default();

        for (name, value) in merged {
            let slot = if name.eq_ignore_ascii_case(CONTENT_TYPE) {
                &mut encoded.content_type
            } else if name.eq_ignore_ascii_case(CACHE_CONTROL) {
                &mut encoded.cache_control
            } else if name.eq_ignore_ascii_case(CONTENT_DISPOSITION) {
                &mut encoded.content_disposition
            } else if name.eq_ignore_ascii_case(CONTENT_ENCODING) {
                &mut encoded.content_encoding
            } else if name.eq_ignore_ascii_case(CONTENT_LANGUAGE) {
                &mut encoded.content_language
            } else {
                encoded.metadata.insert(name, value);
                continue;
            };

            *slot = Some(value).filter(|v| !v.is_empty());
        }

        encoded
    }
}

/// Insert a header, replacing any existing entry whose name differs only in case.
pub fn insert_header(headers: &mut HeaderSet, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value.into());
}

/// Merge header layers from lowest to highest precedence.
pub fn merge_headers<'a, I>(layers: I) -> HeaderSet
where
    I: IntoIterator<Item = &'a HeaderSet>,
{
    let mut merged = HeaderSet::new();
    for layer in layers {
        for (name, value) in layer {
            insert_header(&mut merged, name.as_str(), value.as_str());
        }
    }
    merged
}

/// Case-insensitive header lookup.
pub fn get_header<'a>(headers: &'a HeaderSet, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_layers_win() {
        let defaults = headers(&[("Cache-Control", "public"), ("x-team", "media")]);
        let overrides = headers(&[("cache-control", "private")]);

        let merged = merge_headers([&defaults, &overrides]);
        assert_eq!(merged.len(), 2);
        assert_eq!(get_header(&merged, "Cache-Control"), Some("private"));
        assert_eq!(merged.get("cache-control").map(String::as_str), Some("private"));
        assert_eq!(get_header(&merged, "x-team"), Some("media"));
    }

    #[test]
    fn test_transport_headers_are_extracted() {
        let merged = headers(&[
            ("content-type", "image/png"),
            ("Cache-Control", "max-age=60"),
            ("CONTENT-DISPOSITION", "inline"),
            ("Content-Encoding", "gzip"),
            ("Content-Language", "en"),
            ("x-amz-meta-json", "{}"),
        ]);

        let encoded = EncodedHeaders::from_merged(merged);
        assert_eq!(encoded.content_type.as_deref(), Some("image/png"));
        assert_eq!(encoded.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(encoded.content_disposition.as_deref(), Some("inline"));
        assert_eq!(encoded.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(encoded.content_language.as_deref(), Some("en"));
        assert_eq!(encoded.metadata, headers(&[("x-amz-meta-json", "{}")]));
    }

    #[test]
    fn test_absent_transport_headers_are_unset() {
        let encoded = EncodedHeaders::from_merged(headers(&[("Content-Type", "")]));
        assert_eq!(encoded.content_type, None);
        assert_eq!(encoded.cache_control, None);
        assert!(encoded.metadata.is_empty());
    }

    #[test]
    fn test_get_header_prefers_exact_match() {
        let set = headers(&[("X-Amz-Meta-Json", "a")]);
        assert_eq!(get_header(&set, "x-amz-meta-json"), Some("a"));
        assert_eq!(get_header(&set, "x-amz-meta-extra"), None);
    }
}
