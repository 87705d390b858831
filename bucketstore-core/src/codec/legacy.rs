/*!
Read-only decoder for the legacy `x-amz-meta-extra` header slot.

Older writers stored metadata as a base64-wrapped Ruby `Marshal` 4.8 stream of
a hash. Only the subset of the format needed to rebuild a flat mapping of
scalars is understood; anything else is reported as a malformed payload.
Nothing in this crate produces this format.
*/

use crate::metadata::{MetaValue, Metadata};
use crate::{Result, StoreError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Number;

const FORMAT: &str = "legacy";

const MARSHAL_MAJOR: u8 = 4;
const MARSHAL_MINOR: u8 = 8;

const MAX_DEPTH: usize = 64;

/// Decode a legacy header value into a metadata mapping with string keys.
pub fn decode(payload: &str) -> Result<Metadata> {
    let bytes = decode_base64(payload)?;
    let root = MarshalReader::new(&bytes).read_root()?;
    into_metadata(root)
}

/// Base64 decoding that tolerates line breaks, missing padding and the URL-safe alphabet.
fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let mut cleaned: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let unpadded = cleaned.trim_end_matches('=').len();
    cleaned.truncate(unpadded);
    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }

    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| StoreError::malformed(FORMAT, format!("invalid base64: {e}")))
}

/// Values the reader understands.
#[derive(Debug, Clone, PartialEq)]
enum Marshal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(String),
    Str(String),
    Array(Vec<Marshal>),
    Hash(Vec<(Marshal, Marshal)>),
}

impl Marshal {
    fn kind(&self) -> &'static str {
        match self {
            Marshal::Nil => "nil",
            Marshal::Bool(_) => "boolean",
            Marshal::Int(_) => "integer",
            Marshal::Float(_) => "float",
            Marshal::Symbol(_) => "symbol",
            Marshal::Str(_) => "string",
            Marshal::Array(_) => "array",
            Marshal::Hash(_) => "hash",
        }
    }
}

struct MarshalReader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    symbols: Vec<String>,
    // Slots are reserved before a container's children are read, so links
    // back to an unfinished container stay `None`.
    objects: Vec<Option<Marshal>>,
}

impl<'a> MarshalReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            symbols: Vec::new(),
            objects: Vec::new(),
        }
    }

    fn read_root(&mut self) -> Result<Marshal> {
        let major = self.read_byte()?;
        let minor = self.read_byte()?;
        if major != MARSHAL_MAJOR || minor > MARSHAL_MINOR {
            return Err(self.error(format!(
                "unsupported marshal version {major}.{minor}"
            )));
        }
        self.read_value()
    }

    fn read_value(&mut self) -> Result<Marshal> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let value = self.read_tagged();
        self.depth -= 1;
        value
    }

    fn read_tagged(&mut self) -> Result<Marshal> {
        let tag = self.read_byte()?;
        match tag {
            b'0' => Ok(Marshal::Nil),
            b'T' => Ok(Marshal::Bool(true)),
            b'F' => Ok(Marshal::Bool(false)),
            b'i' => Ok(Marshal::Int(self.read_int()?)),
            b':' => self.read_symbol(),
            b';' => {
                let index = self.read_len()?;
                self.symbols
                    .get(index)
                    .cloned()
                    .map(Marshal::Symbol)
                    .ok_or_else(|| self.error(format!("bad symbol link {index}")))
            }
            b'@' => {
                let index = self.read_len()?;
                match self.objects.get(index) {
                    Some(Some(value)) => Ok(value.clone()),
                    Some(None) => Err(self.error("recursive object link")),
                    None => Err(self.error(format!("bad object link {index}"))),
                }
            }
            b'"' => {
                let bytes = self.read_bytes()?;
                let value = Marshal::Str(self.utf8(bytes)?);
                self.register(value.clone());
                Ok(value)
            }
            b'f' => {
                let value = Marshal::Float(self.read_float()?);
                self.register(value.clone());
                Ok(value)
            }
            b'l' => {
                let value = Marshal::Int(self.read_bignum()?);
                self.register(value.clone());
                Ok(value)
            }
            b'I' => {
                // Instance variables only carry the string encoding here.
                let value = self.read_value()?;
                let count = self.read_len()?;
                for _ in 0..count {
                    self.read_value()?;
                    self.read_value()?;
                }
                Ok(value)
            }
            b'C' | b'e' => {
                // User subclass or extended module: the wrapped value is what counts.
                match self.read_value()? {
                    Marshal::Symbol(_) => self.read_value(),
                    other => Err(self.error(format!(
                        "expected class name symbol, got {}",
                        other.kind()
                    ))),
                }
            }
            b'[' => {
                let slot = self.reserve();
                let count = self.read_len()?;
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                let value = Marshal::Array(items);
                self.objects[slot] = Some(value.clone());
                Ok(value)
            }
            b'{' | b'}' => {
                let slot = self.reserve();
                let count = self.read_len()?;
                let mut entries = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    entries.push((key, value));
                }
                if tag == b'}' {
                    // Default value is irrelevant to the stored mapping.
                    self.read_value()?;
                }
                let value = Marshal::Hash(entries);
                self.objects[slot] = Some(value.clone());
                Ok(value)
            }
            other => Err(self.error(format!(
                "unsupported marshal type '{}'",
                char::from(other).escape_default()
            ))),
        }
    }

    fn read_symbol(&mut self) -> Result<Marshal> {
        let bytes = self.read_bytes()?;
        let name = self.utf8(bytes)?;
        self.symbols.push(name.clone());
        Ok(Marshal::Symbol(name))
    }

    fn read_float(&mut self) -> Result<f64> {
        let bytes = self.read_bytes()?;
        // Very old writers append mantissa bytes after a NUL.
        let text = bytes.split(|b| *b == 0).next().unwrap_or_default();
        let text = std::str::from_utf8(text).map_err(|_| self.error("float is not ASCII"))?;
        match text {
            "nan" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            _ => text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid float '{text}'"))),
        }
    }

    fn read_bignum(&mut self) -> Result<i64> {
        let sign = self.read_byte()?;
        let words = self.read_len()?;
        let len = words
            .checked_mul(2)
            .ok_or_else(|| self.error("bignum length overflow"))?;
        let bytes = self.take(len)?;

        let significant = bytes
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);
        if significant > 8 {
            return Err(self.error("bignum does not fit in 64 bits"));
        }
        let magnitude = bytes[..significant]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));

        match sign {
            b'+' => i64::try_from(magnitude)
                .map_err(|_| self.error("bignum does not fit in 64 bits")),
            b'-' => 0i64
                .checked_sub_unsigned(magnitude)
                .ok_or_else(|| self.error("bignum does not fit in 64 bits")),
            other => Err(self.error(format!("invalid bignum sign byte {other:#04x}"))),
        }
    }

    /// Packed integer as written by `w_long`.
    fn read_int(&mut self) -> Result<i64> {
        let c = self.read_byte()? as i8;
        let value = match c {
            0 => 0,
            5..=127 => i64::from(c) - 5,
            -128..=-5 => i64::from(c) + 5,
            1..=4 => {
                let mut x: i64 = 0;
                for i in 0..c {
                    x |= i64::from(self.read_byte()?) << (8 * i);
                }
                x
            }
            -4..=-1 => {
                let mut x: i64 = -1;
                for i in 0..-c {
                    x &= !(0xff_i64 << (8 * i));
                    x |= i64::from(self.read_byte()?) << (8 * i);
                }
                x
            }
        };
        Ok(value)
    }

    fn read_len(&mut self) -> Result<usize> {
        let value = self.read_int()?;
        usize::try_from(value).map_err(|_| self.error(format!("negative length {value}")))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of stream"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.error("unexpected end of stream"));
        }
        let data: &'a [u8] = self.data;
        let bytes = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn register(&mut self, value: Marshal) {
        self.objects.push(Some(value));
    }

    fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    fn utf8(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|_| self.error("string is not valid UTF-8"))
    }

    fn error(&self, reason: impl Into<String>) -> StoreError {
        StoreError::malformed(FORMAT, format!("{} at byte {}", reason.into(), self.pos))
    }
}

fn into_metadata(root: Marshal) -> Result<Metadata> {
    let entries = match root {
        Marshal::Hash(entries) => entries,
        other => {
            return Err(StoreError::malformed(
                FORMAT,
                format!("expected a hash, got {}", other.kind()),
            ))
        }
    };

    let mut metadata = Metadata::new();
    for (key, value) in entries {
        let key = stringify_key(key)?;
        let value = into_meta_value(&key, value)?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Keys are rendered the way Ruby's `to_s` would render them.
fn stringify_key(key: Marshal) -> Result<String> {
    match key {
        Marshal::Symbol(s) | Marshal::Str(s) => Ok(s),
        Marshal::Int(i) => Ok(i.to_string()),
        Marshal::Float(f) => Ok(float_to_s(f)),
        Marshal::Bool(b) => Ok(b.to_string()),
        Marshal::Nil => Ok(String::new()),
        other => Err(StoreError::malformed(
            FORMAT,
            format!("unsupported {} key", other.kind()),
        )),
    }
}

fn float_to_s(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f != 0.0 && (f.abs() >= 1e16 || f.abs() < 1e-4) {
        // Ruby switches to `1.0e+16` / `1.5e-05` outside [1e-4, 1e16).
        let sci = format!("{f:e}");
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let dot = if mantissa.contains('.') { "" } else { ".0" };
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}{dot}e{sign}{:02}", exponent.unsigned_abs())
    } else if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn into_meta_value(key: &str, value: Marshal) -> Result<MetaValue> {
    match value {
        Marshal::Nil => Ok(MetaValue::Null),
        Marshal::Bool(b) => Ok(MetaValue::Bool(b)),
        Marshal::Int(i) => Ok(MetaValue::Number(i.into())),
        Marshal::Float(f) => Number::from_f64(f).map(MetaValue::Number).ok_or_else(|| {
            StoreError::malformed(FORMAT, format!("non-finite float for key '{key}'"))
        }),
        Marshal::Symbol(s) | Marshal::Str(s) => Ok(MetaValue::String(s)),
        other => Err(StoreError::malformed(
            FORMAT,
            format!("nested {} value for key '{key}'", other.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn read(bytes: &[u8]) -> Result<Marshal> {
        MarshalReader::new(bytes).read_root()
    }

    #[test]
    fn test_packed_integers() {
        assert_eq!(read(b"\x04\x08i\x00").unwrap(), Marshal::Int(0));
        assert_eq!(read(b"\x04\x08i\x06").unwrap(), Marshal::Int(1));
        assert_eq!(read(b"\x04\x08i\x7f").unwrap(), Marshal::Int(122));
        assert_eq!(read(b"\x04\x08i\xfa").unwrap(), Marshal::Int(-1));
        assert_eq!(read(b"\x04\x08i\x01\xc8").unwrap(), Marshal::Int(200));
        assert_eq!(read(b"\x04\x08i\x02\xe8\x03").unwrap(), Marshal::Int(1000));
        assert_eq!(read(b"\x04\x08i\xff\x38").unwrap(), Marshal::Int(-200));
        assert_eq!(
            read(b"\x04\x08i\x04\xff\xff\xff\x3f").unwrap(),
            Marshal::Int(1_073_741_823)
        );
    }

    #[test]
    fn test_bignum() {
        // 2**64 - 1 does not fit, 2**40 does
        assert!(read(b"\x04\x08l+\x09\xff\xff\xff\xff\xff\xff\xff\xff").is_err());
        assert_eq!(
            read(b"\x04\x08l+\x08\x00\x00\x00\x00\x00\x01").unwrap(),
            Marshal::Int(1 << 40)
        );
        assert_eq!(
            read(b"\x04\x08l-\x08\x00\x00\x00\x00\x00\x01").unwrap(),
            Marshal::Int(-(1 << 40))
        );
    }

    #[test]
    fn test_floats() {
        assert_eq!(read(b"\x04\x08f\x081.5").unwrap(), Marshal::Float(1.5));
        assert_eq!(read(b"\x04\x08f\x08inf").unwrap(), Marshal::Float(f64::INFINITY));
        assert!(matches!(read(b"\x04\x08f\x08nan").unwrap(), Marshal::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_symbol_and_object_links() {
        // {:a => "x", :b => <link to "x">, :c => :a}
        let stream = b"\x04\x08{\x08:\x06aI\"\x06x\x06:\x06ET:\x06b@\x06:\x06c;\x00";
        let meta = into_metadata(read(stream).unwrap()).unwrap();

        assert_eq!(meta["a"], MetaValue::from("x"));
        assert_eq!(meta["b"], MetaValue::from("x"));
        assert_eq!(meta["c"], MetaValue::from("a"));
    }

    #[test]
    fn test_recursive_link_is_rejected() {
        // a hash containing a link to itself
        let err = read(b"\x04\x08{\x06:\x06a@\x00").unwrap_err();
        assert!(err.to_string().contains("recursive"));
    }

    #[test]
    fn test_user_subclass_hash() {
        // HashWithIndifferentAccess-style wrapper around {"k" => 1}
        let stream = b"\x04\x08C:\x0cHashWIA{\x06I\"\x06k\x06:\x06ETi\x06";
        let meta = into_metadata(read(stream).unwrap()).unwrap();
        assert_eq!(meta["k"], MetaValue::from(1i64));
    }

    #[test]
    fn test_hash_with_default() {
        let meta = into_metadata(read(b"\x04\x08}\x06:\x06ai\x070").unwrap()).unwrap();
        assert_eq!(meta["a"], MetaValue::from(2i64));
    }

    #[test]
    fn test_stringified_keys() {
        // {1 => true, nil => false, 2.0 => nil, "s" => 0}
        let stream = b"\x04\x08{\x09i\x06T0Ff\x082.00I\"\x06s\x06:\x06ETi\x00";
        let meta = into_metadata(read(stream).unwrap()).unwrap();

        assert_eq!(meta["1"], MetaValue::Bool(true));
        assert_eq!(meta[""], MetaValue::Bool(false));
        assert_eq!(meta["2.0"], MetaValue::Null);
        assert_eq!(meta["s"], MetaValue::from(0i64));

        // {1e16 => true, 1e-5 => false}
        let stream = b"\x04\x08{\x07f\x091e16Tf\x091e-5F";
        let meta = into_metadata(read(stream).unwrap()).unwrap();
        assert_eq!(meta["1.0e+16"], MetaValue::Bool(true));
        assert_eq!(meta["1.0e-05"], MetaValue::Bool(false));
    }

    #[test]
    fn test_float_keys_render_like_ruby() {
        assert_eq!(float_to_s(0.0), "0.0");
        assert_eq!(float_to_s(0.0001), "0.0001");
        assert_eq!(float_to_s(1.25), "1.25");
        assert_eq!(float_to_s(1e15), "1000000000000000.0");
        assert_eq!(float_to_s(1e16), "1.0e+16");
        assert_eq!(float_to_s(1.5e20), "1.5e+20");
        assert_eq!(float_to_s(1e100), "1.0e+100");
        assert_eq!(float_to_s(1e-5), "1.0e-05");
        assert_eq!(float_to_s(-2.5e-7), "-2.5e-07");
        assert_eq!(float_to_s(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_decode_base64_lenient() {
        let stream = b"\x04\x08{\x06:\x09noteI\"\x08a b\x06:\x06ET";
        let encoded = b64(stream);

        let wrapped = format!("{}\n{}\n", &encoded[..8], &encoded[8..]);
        let meta = decode(&wrapped).unwrap();
        assert_eq!(meta["note"], MetaValue::from("a b"));

        let unpadded = encoded.trim_end_matches('=');
        assert_eq!(decode(unpadded).unwrap(), meta);
    }

    #[test]
    fn test_malformed_streams() {
        assert!(decode("!!!not base64!!!").unwrap_err().is_codec_error());
        assert!(decode("").is_err());
        // wrong version
        assert!(decode(&b64(b"\x04\x09{\x00")).is_err());
        // truncated string
        assert!(decode(&b64(b"\x04\x08{\x06:\x06a\"\x0aab")).is_err());
        // arbitrary object
        let err = decode(&b64(b"\x04\x08o:\x08Foo\x00")).unwrap_err();
        assert!(err.to_string().contains("unsupported marshal type 'o'"));
        // top level is not a hash
        assert!(decode(&b64(b"\x04\x08[\x00")).is_err());
        // nested array value
        let err = decode(&b64(b"\x04\x08{\x06:\x06a[\x06i\x06")).unwrap_err();
        assert!(err.to_string().contains("nested array"));
        // NaN cannot be represented
        assert!(decode(&b64(b"\x04\x08{\x06:\x06af\x08nan")).is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut stream = b"\x04\x08".to_vec();
        for _ in 0..100 {
            stream.extend_from_slice(b"[\x06");
        }
        stream.push(b'0');
        let err = read(&stream).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }
}
