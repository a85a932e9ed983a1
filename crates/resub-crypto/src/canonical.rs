//! Canonical encoding for deterministic hashing and signing.
//!
//! Any `Serialize` value is rendered to a compact JSON-like string with
//! these rules:
//! - object keys sorted by UTF-8 byte order, recursively (struct fields too)
//! - no insignificant whitespace
//! - `None` and unit encode as `null`
//! - NaN and infinities encode as the bare tokens `NaN`, `Infinity`, `-Infinity`
//! - integral floats below 2^53 in magnitude encode as integers, so `1.0`
//!   and `1` are the same logical value
//! - byte blobs and non-string map keys are rejected
//!
//! **This encoding is frozen.** Changing it invalidates every stored hash
//! and signature.

use serde::ser::{
    self, Serialize, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
    SerializeTuple, SerializeTupleStruct, SerializeTupleVariant, Serializer,
};

/// Largest magnitude at which an integral float is printed as an integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors from canonical encoding.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("unsupported type: {0}")]
    UnsupportedType(&'static str),

    #[error("serialization error: {0}")]
    Custom(String),
}

impl ser::Error for CanonicalError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Encode a value to its canonical string form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    value.serialize(CanonicalSerializer)
}

/// Hex BLAKE3 digest of the canonical encoding of `value`.
pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(digest_str(&encode(value)?))
}

/// Hex BLAKE3 digest of an already-encoded string.
pub fn digest_str(encoded: &str) -> String {
    hex::encode(blake3::hash(encoded.as_bytes()).as_bytes())
}

fn quote(s: &str) -> Result<String, CanonicalError> {
    serde_json::to_string(s).map_err(|e| CanonicalError::Custom(e.to_string()))
}

fn encode_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if v.fract() == 0.0 && v.abs() < MAX_SAFE_INTEGER {
        (v as i64).to_string()
    } else {
        v.to_string()
    }
}

fn encode_f32(v: f32) -> String {
    if v.is_finite() && v.fract() != 0.0 {
        v.to_string()
    } else {
        encode_f64(f64::from(v))
    }
}

fn wrap_variant(variant: &str, inner: String) -> Result<String, CanonicalError> {
    Ok(format!("{{{}:{}}}", quote(variant)?, inner))
}

struct CanonicalSerializer;

impl Serializer for CanonicalSerializer {
    type Ok = String;
    type Error = CanonicalError;
    type SerializeSeq = SeqEncoder;
    type SerializeTuple = SeqEncoder;
    type SerializeTupleStruct = SeqEncoder;
    type SerializeTupleVariant = TupleVariantEncoder;
    type SerializeMap = MapEncoder;
    type SerializeStruct = MapEncoder;
    type SerializeStructVariant = StructVariantEncoder;

    fn serialize_bool(self, v: bool) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, v: f32) -> Result<String, CanonicalError> {
        Ok(encode_f32(v))
    }

    fn serialize_f64(self, v: f64) -> Result<String, CanonicalError> {
        Ok(encode_f64(v))
    }

    fn serialize_char(self, v: char) -> Result<String, CanonicalError> {
        quote(v.encode_utf8(&mut [0u8; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<String, CanonicalError> {
        quote(v)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, CanonicalError> {
        Err(CanonicalError::UnsupportedType("bytes"))
    }

    fn serialize_none(self) -> Result<String, CanonicalError> {
        Ok("null".to_string())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<String, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, CanonicalError> {
        Ok("null".to_string())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, CanonicalError> {
        Ok("null".to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, CanonicalError> {
        quote(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<String, CanonicalError> {
        wrap_variant(variant, value.serialize(CanonicalSerializer)?)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqEncoder, CanonicalError> {
        Ok(SeqEncoder::with_capacity(len.unwrap_or(0)))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqEncoder, CanonicalError> {
        Ok(SeqEncoder::with_capacity(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqEncoder, CanonicalError> {
        Ok(SeqEncoder::with_capacity(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantEncoder, CanonicalError> {
        Ok(TupleVariantEncoder {
            variant,
            inner: SeqEncoder::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapEncoder, CanonicalError> {
        Ok(MapEncoder::with_capacity(len.unwrap_or(0)))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapEncoder, CanonicalError> {
        Ok(MapEncoder::with_capacity(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructVariantEncoder, CanonicalError> {
        Ok(StructVariantEncoder {
            variant,
            inner: MapEncoder::with_capacity(len),
        })
    }
}

struct SeqEncoder {
    items: Vec<String>,
}

impl SeqEncoder {
    fn with_capacity(len: usize) -> Self {
        Self {
            items: Vec::with_capacity(len),
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.items.push(value.serialize(CanonicalSerializer)?);
        Ok(())
    }

    fn finish(self) -> String {
        format!("[{}]", self.items.join(","))
    }
}

impl SerializeSeq for SeqEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        Ok(self.finish())
    }
}

impl SerializeTuple for SeqEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        Ok(self.finish())
    }
}

impl SerializeTupleStruct for SeqEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.push(value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        Ok(self.finish())
    }
}

struct TupleVariantEncoder {
    variant: &'static str,
    inner: SeqEncoder,
}

impl SerializeTupleVariant for TupleVariantEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        self.inner.push(value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        wrap_variant(self.variant, self.inner.finish())
    }
}

struct MapEncoder {
    entries: Vec<(String, String)>,
    pending_key: Option<String>,
}

impl MapEncoder {
    fn with_capacity(len: usize) -> Self {
        Self {
            entries: Vec::with_capacity(len),
            pending_key: None,
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, key: String, value: &T) -> Result<(), CanonicalError> {
        self.entries
            .push((key, value.serialize(CanonicalSerializer)?));
        Ok(())
    }

    fn finish(mut self) -> Result<String, CanonicalError> {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut parts = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            parts.push(format!("{}:{}", quote(key)?, value));
        }
        Ok(format!("{{{}}}", parts.join(",")))
    }
}

impl SerializeMap for MapEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), CanonicalError> {
        self.pending_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonicalError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| CanonicalError::Custom("map value without a key".into()))?;
        self.push(key, value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        self.finish()
    }
}

impl SerializeStruct for MapEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.push(key.to_string(), value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        self.finish()
    }
}

struct StructVariantEncoder {
    variant: &'static str,
    inner: MapEncoder,
}

impl SerializeStructVariant for StructVariantEncoder {
    type Ok = String;
    type Error = CanonicalError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonicalError> {
        self.inner.push(key.to_string(), value)
    }

    fn end(self) -> Result<String, CanonicalError> {
        wrap_variant(self.variant, self.inner.finish()?)
    }
}

/// Map keys must be strings; produces the raw (unquoted) key.
struct KeySerializer;

fn unsupported_key<T>() -> Result<T, CanonicalError> {
    Err(CanonicalError::UnsupportedType("non-string map key"))
}

impl Serializer for KeySerializer {
    type Ok = String;
    type Error = CanonicalError;
    type SerializeSeq = ser::Impossible<String, CanonicalError>;
    type SerializeTuple = ser::Impossible<String, CanonicalError>;
    type SerializeTupleStruct = ser::Impossible<String, CanonicalError>;
    type SerializeTupleVariant = ser::Impossible<String, CanonicalError>;
    type SerializeMap = ser::Impossible<String, CanonicalError>;
    type SerializeStruct = ser::Impossible<String, CanonicalError>;
    type SerializeStructVariant = ser::Impossible<String, CanonicalError>;

    fn serialize_str(self, v: &str) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, CanonicalError> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, CanonicalError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, CanonicalError> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_i8(self, _v: i8) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_i16(self, _v: i16) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_i32(self, _v: i32) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_i64(self, _v: i64) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_u8(self, _v: u8) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_u16(self, _v: u16) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_u32(self, _v: u32) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_u64(self, _v: u64) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_f32(self, _v: f32) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_f64(self, _v: f64) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_none(self) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_unit(self) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, CanonicalError> {
        unsupported_key()
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CanonicalError> {
        unsupported_key()
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CanonicalError> {
        unsupported_key()
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CanonicalError> {
        unsupported_key()
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CanonicalError> {
        unsupported_key()
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CanonicalError> {
        unsupported_key()
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CanonicalError> {
        unsupported_key()
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CanonicalError> {
        unsupported_key()
    }
}
