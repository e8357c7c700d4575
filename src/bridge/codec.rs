//! Payload codecs
//!
//! One codec is active per scripting environment. The text profile carries
//! JSON documents, the binary profile carries bincode bytes.

use std::fmt;

use bincode::Options;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::value::{ObjectMap, ScriptValue};
use crate::bridge::Payload;
use crate::engine::builtins::json::json_number;

/// Largest binary payload the binary codec will decode
const BINARY_LIMIT: u64 = 16 * 1024 * 1024;

/// Encoding used for bridge payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PayloadProfile {
    #[default]
    Text,
    Binary,
}

impl fmt::Display for PayloadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadProfile::Text => write!(f, "text"),
            PayloadProfile::Binary => write!(f, "binary"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("value is not representable: {0}")]
    NotRepresentable(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("expected a {expected} payload, got a {found} payload")]
    ProfileMismatch {
        expected: PayloadProfile,
        found: PayloadProfile,
    },
}

pub trait PayloadCodec {
    fn profile(&self) -> PayloadProfile;
    fn encode(&self, value: &ScriptValue) -> Result<Payload, CodecError>;
    fn decode(&self, payload: &Payload) -> Result<ScriptValue, CodecError>;
}

/// Shared codec for a profile
pub fn codec_for(profile: PayloadProfile) -> Box<dyn PayloadCodec> {
    match profile {
        PayloadProfile::Text => Box::new(TextCodec),
        PayloadProfile::Binary => Box::new(BinaryCodec),
    }
}

// ============================================================================
// Text
// ============================================================================

/// JSON text. `undefined` is written as `null`; bytes and non-finite
/// numbers have no JSON form.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    fn to_json(value: &ScriptValue) -> Result<serde_json::Value, CodecError> {
        Ok(match value {
            ScriptValue::Undefined | ScriptValue::Null => serde_json::Value::Null,
            ScriptValue::Bool(b) => serde_json::Value::Bool(*b),
            ScriptValue::Number(n) if n.is_finite() => json_number(*n),
            ScriptValue::Number(n) => {
                return Err(CodecError::NotRepresentable(format!("{} in a text payload", n)))
            }
            ScriptValue::String(s) => serde_json::Value::String(s.clone()),
            ScriptValue::Bytes(_) => {
                return Err(CodecError::NotRepresentable(
                    "byte array in a text payload".to_string(),
                ))
            }
            ScriptValue::Array(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Result<_, _>>()?,
            ),
            ScriptValue::Object(map) => {
                let mut object = serde_json::Map::new();
                for (key, item) in map {
                    object.insert(key.clone(), Self::to_json(item)?);
                }
                serde_json::Value::Object(object)
            }
        })
    }

    fn from_json(json: serde_json::Value) -> ScriptValue {
        match json {
            serde_json::Value::Null => ScriptValue::Null,
            serde_json::Value::Bool(b) => ScriptValue::Bool(b),
            serde_json::Value::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => ScriptValue::String(s),
            serde_json::Value::Array(items) => {
                ScriptValue::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => ScriptValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect::<ObjectMap>(),
            ),
        }
    }
}

impl PayloadCodec for TextCodec {
    fn profile(&self) -> PayloadProfile {
        PayloadProfile::Text
    }

    fn encode(&self, value: &ScriptValue) -> Result<Payload, CodecError> {
        let json = Self::to_json(value)?;
        serde_json::to_string(&json)
            .map(Payload::Text)
            .map_err(|e| CodecError::NotRepresentable(e.to_string()))
    }

    fn decode(&self, payload: &Payload) -> Result<ScriptValue, CodecError> {
        let Payload::Text(text) = payload else {
            return Err(CodecError::ProfileMismatch {
                expected: PayloadProfile::Text,
                found: payload.profile(),
            });
        };
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
        Ok(Self::from_json(json))
    }
}

// ============================================================================
// Binary
// ============================================================================

/// bincode serialization of [`ScriptValue`]; every value is representable
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new().with_limit(BINARY_LIMIT)
    }
}

impl PayloadCodec for BinaryCodec {
    fn profile(&self) -> PayloadProfile {
        PayloadProfile::Binary
    }

    fn encode(&self, value: &ScriptValue) -> Result<Payload, CodecError> {
        Self::options()
            .serialize(value)
            .map(Payload::Binary)
            .map_err(|e| CodecError::NotRepresentable(e.to_string()))
    }

    fn decode(&self, payload: &Payload) -> Result<ScriptValue, CodecError> {
        let Payload::Binary(bytes) = payload else {
            return Err(CodecError::ProfileMismatch {
                expected: PayloadProfile::Binary,
                found: payload.profile(),
            });
        };
        Self::options()
            .deserialize(bytes)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScriptValue {
        let mut map = ObjectMap::new();
        map.insert("name".to_string(), ScriptValue::from("widget"));
        map.insert("tags".to_string(), ScriptValue::Array(vec!["a".into(), "b".into()]));
        map.insert("ratio".to_string(), ScriptValue::Number(0.25));
        map.insert("count".to_string(), ScriptValue::Number(3.0));
        map.insert("none".to_string(), ScriptValue::Null);
        ScriptValue::Array(vec![ScriptValue::Object(map), ScriptValue::Bool(false)])
    }

    #[test]
    fn test_text_round_trip() {
        let codec = TextCodec;
        let value = sample();
        assert_eq!(codec.decode(&codec.encode(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn test_text_writes_integers_without_fraction() {
        let payload = TextCodec.encode(&ScriptValue::Array(vec![21.0.into(), 1.5.into()])).unwrap();
        assert_eq!(payload, Payload::Text("[21,1.5]".to_string()));
    }

    #[test]
    fn test_text_undefined_becomes_null() {
        let payload = TextCodec.encode(&ScriptValue::Undefined).unwrap();
        assert_eq!(payload, Payload::Text("null".to_string()));
    }

    #[test]
    fn test_text_rejects_bytes_and_non_finite() {
        assert!(matches!(
            TextCodec.encode(&ScriptValue::Bytes(vec![1])),
            Err(CodecError::NotRepresentable(_))
        ));
        assert!(TextCodec.encode(&ScriptValue::Number(f64::INFINITY)).is_err());
        assert!(TextCodec.encode(&ScriptValue::Array(vec![f64::NAN.into()])).is_err());
    }

    #[test]
    fn test_text_malformed() {
        let err = TextCodec.decode(&Payload::Text("{oops".to_string())).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_binary_round_trip_includes_bytes() {
        let codec = BinaryCodec;
        let value = ScriptValue::Array(vec![
            sample(),
            ScriptValue::Bytes(vec![0, 255, 7]),
            ScriptValue::Undefined,
            ScriptValue::Number(f64::INFINITY),
        ]);
        assert_eq!(codec.decode(&codec.encode(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn test_object_key_order_survives() {
        let mut map = ObjectMap::new();
        for key in ["zeta", "alpha", "mid"] {
            map.insert(key.to_string(), ScriptValue::Null);
        }
        let value = ScriptValue::Object(map);
        for codec in [&TextCodec as &dyn PayloadCodec, &BinaryCodec] {
            let ScriptValue::Object(decoded) = codec.decode(&codec.encode(&value).unwrap()).unwrap() else {
                panic!("expected an object");
            };
            let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
            assert_eq!(keys, ["zeta", "alpha", "mid"], "{}", codec.profile());
        }
    }

    #[test]
    fn test_binary_malformed() {
        let err = BinaryCodec.decode(&Payload::Binary(vec![0xff, 0xff, 0xff])).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_profile_mismatch() {
        let err = TextCodec.decode(&Payload::Binary(vec![])).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ProfileMismatch {
                expected: PayloadProfile::Text,
                found: PayloadProfile::Binary
            }
        ));
        assert!(BinaryCodec.decode(&Payload::Text(String::new())).is_err());
    }

    #[test]
    fn test_codec_for_profile() {
        assert_eq!(codec_for(PayloadProfile::Binary).profile(), PayloadProfile::Binary);
        assert_eq!(codec_for(PayloadProfile::Text).profile(), PayloadProfile::Text);
    }
}
