//! The `JSON` namespace, built on serde_json

use serde::Serialize;
use serde_json::{Map, Number};

use super::{arg, define_method};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{Exception, Value};

/// Nesting beyond this depth is rejected instead of recursing further
const MAX_DEPTH: usize = 512;

pub fn install(realm: &Realm) {
    let json = realm.new_object();
    define_method(&json, "stringify", stringify);
    define_method(&json, "parse", |interp, _, args| {
        let text = arg(&args, 0).to_display_string();
        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| interp.error("SyntaxError", format!("Unexpected token in JSON: {}", e)))?;
        Ok(from_json(interp.realm(), parsed))
    });
    realm.define_global("JSON", Value::Object(json));
}

/// Build a script value from parsed JSON
pub fn from_json(realm: &Realm, json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(items) => {
            Value::array(items.into_iter().map(|item| from_json(realm, item)).collect())
        }
        serde_json::Value::Object(map) => {
            let object = realm.new_object();
            {
                let mut object = object.borrow_mut();
                for (key, value) in map {
                    object.properties.insert(key, from_json(realm, value));
                }
            }
            Value::Object(object)
        }
    }
}

/// JSON number for a finite value; integral values serialize without a fraction
pub fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9007199254740992.0 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

enum Replacer {
    None,
    Function(Value),
    Keys(Vec<String>),
}

struct Stringifier<'a> {
    interp: &'a mut Interpreter,
    replacer: Replacer,
    stack: Vec<*const ()>,
}

impl Stringifier<'_> {
    /// `None` for values JSON cannot represent (undefined, functions)
    fn convert(&mut self, holder: &Value, key: &str, value: Value) -> Result<Option<serde_json::Value>, Exception> {
        let mut value = value;
        if matches!(value, Value::Object(_)) {
            let to_json = self.interp.get_property(&value, "toJSON")?;
            if to_json.is_callable() {
                value = self.interp.call_value(&to_json, value, vec![Value::from(key)])?;
            }
        }
        if let Replacer::Function(replacer) = &self.replacer {
            let replacer = replacer.clone();
            value = self
                .interp
                .call_value(&replacer, holder.clone(), vec![Value::from(key), value])?;
        }

        Ok(Some(match value {
            Value::Undefined | Value::Function(_) | Value::Native(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => json_number(n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            nested @ (Value::Array(_) | Value::Bytes(_) | Value::Object(_)) => {
                return self.convert_nested(nested)
            }
        }))
    }

    fn convert_nested(&mut self, value: Value) -> Result<Option<serde_json::Value>, Exception> {
        let identity = value.identity();
        if let Some(id) = identity {
            if self.stack.contains(&id) {
                return Err(self.interp.type_error("Converting circular structure to JSON"));
            }
            if self.stack.len() >= MAX_DEPTH {
                return Err(self.interp.range_error("Maximum JSON nesting depth exceeded"));
            }
            self.stack.push(id);
        }

        let result = if let Value::Array(items) = &value {
            let items = items.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let converted = self.convert(&value, &i.to_string(), item)?;
                out.push(converted.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(out)
        } else {
            let mut map = Map::new();
            for (key, item) in self.interp.own_entries(&value) {
                if let Replacer::Keys(keys) = &self.replacer {
                    if !keys.contains(&key) {
                        continue;
                    }
                }
                if let Some(converted) = self.convert(&value, &key, item)? {
                    map.insert(key, converted);
                }
            }
            serde_json::Value::Object(map)
        };

        self.stack.pop();
        Ok(Some(result))
    }
}

fn stringify(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let replacer = match arg(&args, 1) {
        f if f.is_callable() => Replacer::Function(f),
        Value::Array(keys) => Replacer::Keys(keys.borrow().iter().map(Value::to_display_string).collect()),
        _ => Replacer::None,
    };
    let indent = match arg(&args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let holder = Value::Object(interp.realm().new_object());
    let mut stringifier = Stringifier {
        interp: &mut *interp,
        replacer,
        stack: Vec::new(),
    };
    let Some(json) = stringifier.convert(&holder, "", arg(&args, 0))? else {
        return Ok(Value::Undefined);
    };

    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        json.serialize(&mut serializer)
            .map(|_| String::from_utf8_lossy(&buf).into_owned())
    };
    text.map(Value::from)
        .map_err(|e| interp.type_error(format!("JSON serialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_json_number() {
        assert_eq!(json_number(3.0).to_string(), "3");
        assert_eq!(json_number(2.5).to_string(), "2.5");
        assert_eq!(json_number(f64::NAN), serde_json::Value::Null);
    }

    #[test]
    fn test_stringify_basic() {
        assert_eq!(
            eval_string("JSON.stringify({b: 1, a: [true, null, 'x'], u: undefined, f() {}})"),
            r#"{"b":1,"a":[true,null,"x"]}"#
        );
        assert_eq!(eval_string("JSON.stringify([undefined, NaN])"), "[null,null]");
        assert_eq!(eval_string("typeof JSON.stringify(undefined)"), "undefined");
    }

    #[test]
    fn test_stringify_indent_and_replacer() {
        assert_eq!(eval_string("JSON.stringify({a: 1}, null, 2)"), "{\n  \"a\": 1\n}");
        assert_eq!(eval_string("JSON.stringify({a: 1, b: 2}, ['b'])"), r#"{"b":2}"#);
        assert_eq!(
            eval_string("JSON.stringify({a: 1, b: 2}, (k, v) => k === 'a' ? undefined : v)"),
            r#"{"b":2}"#
        );
    }

    #[test]
    fn test_stringify_date_uses_to_json() {
        assert_eq!(eval_string("JSON.stringify({d: new Date(0)})"), r#"{"d":"1970-01-01T00:00:00.000Z"}"#);
    }

    #[test]
    fn test_stringify_cycle_fails() {
        let err = eval("const o = {}; o.self = o; JSON.stringify(o)").unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_parse() {
        assert_eq!(eval_number("JSON.parse('{\"a\": [1, 2.5]}').a[1]"), 2.5);
        assert_eq!(eval_string("Object.keys(JSON.parse('{\"z\": 1, \"a\": 2}')).join()"), "z,a");
        let err = eval("JSON.parse('{bad')").unwrap_err();
        assert!(err.to_string().starts_with("SyntaxError"));
    }
}
