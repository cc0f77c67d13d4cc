//! Body codecs: conversion between wire bytes and generic values.
//!
//! Action params and results travel through the gateway as
//! [`serde_json::Value`]. A [`Codec`] decides how those values look on the
//! wire. [`JsonCodec`] is the default.

use std::fmt;

use serde_json::Value;

/// Error raised while encoding or decoding a body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// The request body could not be decoded.
    #[error("failed to decode body: {0}")]
    Decode(String),
    /// The value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(String),
}

/// Pluggable body codec.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Content type written on responses produced with this codec.
    fn content_type(&self) -> &'static str;

    /// Decodes raw request bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not valid for this
    /// codec.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Encodes a value into response bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        // An empty body means "no params".
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_decodes_to_empty_object() {
        let codec = JsonCodec;
        let Ok(value) = codec.decode(b"  \n") else {
            panic!("empty body should decode");
        };
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn decodes_json_object() {
        let codec = JsonCodec;
        let Ok(value) = codec.decode(br#"{"a":1,"b":[2,3]}"#) else {
            panic!("valid json should decode");
        };
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], serde_json::json!([2, 3]));
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let codec = JsonCodec;
        let result = codec.decode(b"{not json");
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn encodes_compact_json() {
        let codec = JsonCodec;
        let Ok(bytes) = codec.encode(&serde_json::json!({ "sum": 3 })) else {
            panic!("encode failed");
        };
        assert_eq!(bytes, br#"{"sum":3}"#.to_vec());
        assert_eq!(codec.content_type(), "application/json");
    }
}
