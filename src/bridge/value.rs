//! Tagged values crossing the script/host boundary

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bridge::codec::CodecError;
use crate::engine::builtins::date::to_iso_string;
use crate::engine::{Object, ObjectKind, Realm, Value};
use crate::error::ScriptError;

/// Nesting beyond this depth cannot cross the bridge
const MAX_DEPTH: usize = 256;

/// String-keyed entries in insertion order
pub type ObjectMap = IndexMap<String, ScriptValue>;

/// A value as seen by the host
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<ScriptValue>),
    Object(ObjectMap),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Bytes(_) => "bytes",
            ScriptValue::Array(_) => "array",
            ScriptValue::Object(_) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// Snapshot of a runtime value. Functions and cyclic structures are
    /// not representable.
    pub fn from_runtime(value: &Value) -> Result<ScriptValue, CodecError> {
        let mut stack = Vec::new();
        convert(value, &mut stack)
    }

    /// Fresh runtime value in `realm`
    pub fn to_runtime(&self, realm: &Realm) -> Value {
        match self {
            ScriptValue::Undefined => Value::Undefined,
            ScriptValue::Null => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::Number(n) => Value::Number(*n),
            ScriptValue::String(s) => Value::from(s.as_str()),
            ScriptValue::Bytes(data) => Value::bytes(data.clone()),
            ScriptValue::Array(items) => {
                Value::array(items.iter().map(|item| item.to_runtime(realm)).collect())
            }
            ScriptValue::Object(map) => {
                let object = realm.new_object();
                {
                    let mut object = object.borrow_mut();
                    for (key, value) in map {
                        object.properties.insert(key.clone(), value.to_runtime(realm));
                    }
                }
                Value::Object(object)
            }
        }
    }
}

fn convert(value: &Value, stack: &mut Vec<*const ()>) -> Result<ScriptValue, CodecError> {
    let identity = value.identity();
    if let Some(id) = identity {
        if stack.contains(&id) {
            return Err(CodecError::NotRepresentable("cyclic structure".to_string()));
        }
        if stack.len() >= MAX_DEPTH {
            return Err(CodecError::NotRepresentable("structure nested too deeply".to_string()));
        }
        stack.push(id);
    }

    let converted = match value {
        Value::Undefined => ScriptValue::Undefined,
        Value::Null => ScriptValue::Null,
        Value::Bool(b) => ScriptValue::Bool(*b),
        Value::Number(n) => ScriptValue::Number(*n),
        Value::String(s) => ScriptValue::String(s.to_string()),
        Value::Bytes(data) => ScriptValue::Bytes(data.borrow().clone()),
        Value::Array(items) => {
            let items = items.borrow().clone();
            ScriptValue::Array(
                items
                    .iter()
                    .map(|item| convert(item, stack))
                    .collect::<Result<_, _>>()?,
            )
        }
        Value::Object(object) => {
            let kind = object.borrow().kind;
            match kind {
                ObjectKind::Date(t) => to_iso_string(t)
                    .map(ScriptValue::String)
                    .unwrap_or(ScriptValue::Null),
                ObjectKind::Error | ObjectKind::HostError(_) => {
                    let mut map = ObjectMap::new();
                    for key in ["name", "message"] {
                        let field = Object::lookup(object, key).unwrap_or_default();
                        map.insert(key.to_string(), ScriptValue::String(field.to_display_string()));
                    }
                    ScriptValue::Object(map)
                }
                ObjectKind::Ordinary => {
                    let entries: Vec<(String, Value)> = object
                        .borrow()
                        .properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let mut map = ObjectMap::new();
                    for (key, item) in entries {
                        map.insert(key, convert(&item, stack)?);
                    }
                    ScriptValue::Object(map)
                }
            }
        }
        Value::Function(_) | Value::Native(_) => {
            return Err(CodecError::NotRepresentable("function".to_string()))
        }
    };

    if identity.is_some() {
        stack.pop();
    }
    Ok(converted)
}

// ============================================================================
// Conversions
// ============================================================================

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<Vec<ScriptValue>> for ScriptValue {
    fn from(items: Vec<ScriptValue>) -> Self {
        ScriptValue::Array(items)
    }
}

fn cast_error(value: &ScriptValue, to: &str) -> ScriptError {
    ScriptError::Cast {
        from: value.type_name().to_string(),
        to: to.to_string(),
    }
}

impl TryFrom<ScriptValue> for f64 {
    type Error = ScriptError;

    fn try_from(value: ScriptValue) -> Result<Self, Self::Error> {
        value.as_f64().ok_or_else(|| cast_error(&value, "number"))
    }
}

impl TryFrom<ScriptValue> for bool {
    type Error = ScriptError;

    fn try_from(value: ScriptValue) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| cast_error(&value, "boolean"))
    }
}

impl TryFrom<ScriptValue> for String {
    type Error = ScriptError;

    fn try_from(value: ScriptValue) -> Result<Self, Self::Error> {
        match value {
            ScriptValue::String(s) => Ok(s),
            other => Err(cast_error(&other, "string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtins::test_support::eval;

    #[test]
    fn test_from_runtime_nested() {
        let value = eval("({list: [1, 'two', null], flag: true, nested: {x: undefined}})").unwrap();
        let converted = ScriptValue::from_runtime(&value).unwrap();
        let mut nested = ObjectMap::new();
        nested.insert("x".to_string(), ScriptValue::Undefined);
        let mut expected = ObjectMap::new();
        expected.insert(
            "list".to_string(),
            ScriptValue::Array(vec![1.0.into(), "two".into(), ScriptValue::Null]),
        );
        expected.insert("flag".to_string(), true.into());
        expected.insert("nested".to_string(), ScriptValue::Object(nested));
        assert_eq!(converted, ScriptValue::Object(expected));
    }

    #[test]
    fn test_functions_are_not_representable() {
        let value = eval("[() => 1]").unwrap();
        assert!(matches!(
            ScriptValue::from_runtime(&value),
            Err(CodecError::NotRepresentable(_))
        ));
    }

    #[test]
    fn test_cycles_are_not_representable() {
        let value = eval("const a = []; a.push(a); a").unwrap();
        assert!(ScriptValue::from_runtime(&value).is_err());
    }

    #[test]
    fn test_shared_but_acyclic_references_convert() {
        let value = eval("const shared = {v: 1}; [shared, shared]").unwrap();
        assert!(ScriptValue::from_runtime(&value).is_ok());
    }

    #[test]
    fn test_dates_and_errors() {
        let value = eval("[new Date(0), new TypeError('bad')]").unwrap();
        let converted = ScriptValue::from_runtime(&value).unwrap();
        let items = converted.as_array().unwrap();
        assert_eq!(items[0].as_str(), Some("1970-01-01T00:00:00.000Z"));
        let ScriptValue::Object(error) = &items[1] else {
            panic!("error should convert to an object");
        };
        assert_eq!(error["name"].as_str(), Some("TypeError"));
        assert_eq!(error["message"].as_str(), Some("bad"));
    }

    #[test]
    fn test_to_runtime() {
        let realm = Realm::new();
        let value = ScriptValue::Array(vec![ScriptValue::Bytes(vec![1, 2]), "s".into()]);
        let runtime = value.to_runtime(&realm);
        assert_eq!(runtime.to_display_string(), "1,2,s");
        assert_eq!(ScriptValue::from_runtime(&runtime).unwrap(), value);
    }

    #[test]
    fn test_try_from_casts() {
        assert_eq!(f64::try_from(ScriptValue::Number(2.0)).unwrap(), 2.0);
        let err = f64::try_from(ScriptValue::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "Cannot convert string to number");
        assert!(String::try_from(ScriptValue::Null).is_err());
    }
}
