/*!
Metadata codec: carries a metadata mapping through the object store's
string-valued header slots and back.

On write the mapping is escaped, serialized to JSON and stored in the
[`JSON_HEADER`] slot, merged between store-wide default headers and per-write
overrides. On read the JSON slot is preferred; objects written by older
versions may only carry the read-only [`LEGACY_HEADER`] slot.

## Example

```rust
use bucketstore_core::codec::{self, HeaderSet};
use bucketstore_core::metadata::{Metadata, MetaValue};

let mut meta = Metadata::new();
meta.insert("note".to_string(), MetaValue::from("a b%c"));

let encoded = codec::encode(&HeaderSet::new(), &HeaderSet::new(), &meta)?;
assert_eq!(encoded.metadata["x-amz-meta-json"], r#"{"note":"a+b%25c"}"#);

let decoded = codec::decode(&encoded.metadata)?;
assert_eq!(decoded, Some(meta));
# Ok::<(), bucketstore_core::StoreError>(())
```
*/

pub mod escape;
pub mod headers;
pub mod legacy;

pub use headers::{
    get_header, insert_header, merge_headers, EncodedHeaders, HeaderSet, CACHE_CONTROL,
    CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_TYPE,
};

use crate::metadata::{json_kind, MetaValue, Metadata};
use crate::{Result, StoreError};
use serde_json::Value;
use tracing::{debug, warn};

/// Header slot carrying the JSON-encoded metadata.
///
/// The name dates from an earlier S3 backend. Stored objects depend on it
/// literally, so it must not change.
pub const JSON_HEADER: &str = "x-amz-meta-json";

/// Read-only header slot carrying base64-wrapped marshalled metadata.
pub const LEGACY_HEADER: &str = "x-amz-meta-extra";

/// Upper bound on the serialized metadata slot, matching the provider's
/// custom metadata allowance.
pub const MAX_METADATA_BYTES: usize = 8 * 1024;

/// Encodings a stored object's metadata may be found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingFormat {
    /// Escaped JSON in [`JSON_HEADER`]; the only format written
    Modern,
    /// Base64 marshal stream in [`LEGACY_HEADER`]
    LegacyBinary,
}

impl EncodingFormat {
    /// Pick the format to decode with, based on which slot is populated.
    ///
    /// An empty JSON slot does not count as populated.
    pub fn detect(headers: &HeaderSet) -> Option<Self> {
        match get_header(headers, JSON_HEADER) {
            Some(json) if !json.is_empty() => Some(EncodingFormat::Modern),
            _ => get_header(headers, LEGACY_HEADER).map(|_| EncodingFormat::LegacyBinary),
        }
    }

    /// Header slot this format is stored in
    pub fn header_name(self) -> &'static str {
        match self {
            EncodingFormat::Modern => JSON_HEADER,
            EncodingFormat::LegacyBinary => LEGACY_HEADER,
        }
    }

    /// Decode a single slot value in this format.
    pub fn decode(self, payload: &str) -> Result<Metadata> {
        match self {
            EncodingFormat::Modern => decode_modern(payload),
            EncodingFormat::LegacyBinary => legacy::decode(payload),
        }
    }
}

/// Serialize metadata into the value of the [`JSON_HEADER`] slot.
pub fn encode_metadata(metadata: &Metadata) -> Result<String> {
    let escaped: Metadata = metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                MetaValue::String(s) => MetaValue::String(escape::escape(s)),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect();

    let json = serde_json::to_string(&escaped)?;
    if json.len() > MAX_METADATA_BYTES {
        return Err(StoreError::validation(format!(
            "encoded metadata is {} bytes, limit is {MAX_METADATA_BYTES}",
            json.len()
        )));
    }
    Ok(json)
}

/// Build the headers for an upload.
///
/// Precedence, lowest first: `defaults`, the metadata slot, `overrides`.
pub fn encode(
    defaults: &HeaderSet,
    overrides: &HeaderSet,
    metadata: &Metadata,
) -> Result<EncodedHeaders> {
    let mut metadata_slot = HeaderSet::new();
    metadata_slot.insert(JSON_HEADER.to_string(), encode_metadata(metadata)?);

    let merged = merge_headers([defaults, &metadata_slot, overrides]);
    Ok(EncodedHeaders::from_merged(merged))
}

/// Like [`encode`], for metadata supplied as a loosely typed JSON object.
///
/// Nested arrays or objects fail with [`StoreError::UnsupportedValueType`].
pub fn encode_json(
    defaults: &HeaderSet,
    overrides: &HeaderSet,
    metadata: Value,
) -> Result<EncodedHeaders> {
    let metadata = crate::metadata::metadata_from_json(metadata)?;
    encode(defaults, overrides, &metadata)
}

/// Decode the metadata carried by a header set.
///
/// Returns `Ok(None)` when neither metadata slot is present.
pub fn decode(headers: &HeaderSet) -> Result<Option<Metadata>> {
    let Some(format) = EncodingFormat::detect(headers) else {
        return Ok(None);
    };
    let payload = get_header(headers, format.header_name()).unwrap_or_default();
    debug!(format = ?format, bytes = payload.len(), "Decoding object metadata");
    format.decode(payload).map(Some)
}

/// Fail-closed variant of [`decode`]: any decode failure yields `None`.
pub fn decode_headers(headers: &HeaderSet) -> Option<Metadata> {
    match decode(headers) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(error = %e, "Discarding undecodable object metadata");
            #[cfg(feature = "metrics")]
            crate::observability::StoreMetrics::global().record_decode_failure();
            None
        }
    }
}

fn decode_modern(payload: &str) -> Result<Metadata> {
    let parsed: Value = serde_json::from_str(payload)
        .map_err(|e| StoreError::malformed("modern", format!("invalid JSON: {e}")))?;

    let map = match parsed {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::malformed(
                "modern",
                format!("expected a JSON object, got {}", json_kind(&other)),
            ))
        }
    };

    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => MetaValue::String(escape::unescape(&s)?),
                Value::Null => MetaValue::Null,
                Value::Bool(b) => MetaValue::Bool(b),
                Value::Number(n) => MetaValue::Number(n),
                nested => {
                    return Err(StoreError::malformed(
                        "modern",
                        format!("nested {} value for key '{key}'", json_kind(&nested)),
                    ))
                }
            };
            Ok((key, value))
        })
        .collect()
}
