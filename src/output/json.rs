//! JSON output formatting

use serde_json::{json, Value};

use crate::bridge::ScriptValue;
use crate::engine::builtins::json::json_number;
use crate::output::formatter::Output;

pub fn format_json(output: &Output) -> String {
    let data: Value = match output {
        Output::Value(value) => json!({ "value": to_json(value) }),
        Output::AllowList { profile, names } => json!({ "profile": profile, "names": names }),
        Output::Check {
            path,
            outline,
            issues,
            passed,
        } => json!({
            "path": path,
            "outline": outline,
            "issues": issues,
            "passed": passed,
        }),
        Output::Message(s) => json!({ "message": s }),
        Output::Empty => json!({ "empty": true }),
    };

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_string())
}

/// Lossy JSON form for display: `undefined` and non-finite numbers become
/// `null`, bytes become number arrays
pub fn to_json(value: &ScriptValue) -> Value {
    match value {
        ScriptValue::Undefined | ScriptValue::Null => Value::Null,
        ScriptValue::Bool(b) => Value::Bool(*b),
        ScriptValue::Number(n) => json_number(*n),
        ScriptValue::String(s) => Value::String(s.clone()),
        ScriptValue::Bytes(data) => Value::Array(data.iter().map(|b| json!(b)).collect()),
        ScriptValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        ScriptValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Profile;

    #[test]
    fn test_value_json() {
        let value = ScriptValue::Array(vec![3.0.into(), ScriptValue::Undefined, ScriptValue::Bytes(vec![9])]);
        let parsed: Value = serde_json::from_str(&format_json(&Output::Value(value))).unwrap();
        assert_eq!(parsed, json!({ "value": [3, null, [9]] }));
    }

    #[test]
    fn test_allow_list_json() {
        let output = Output::AllowList {
            profile: Profile::Broad,
            names: vec!["JSON".into()],
        };
        let parsed: Value = serde_json::from_str(&format_json(&output)).unwrap();
        assert_eq!(parsed["profile"], "broad");
        assert_eq!(parsed["names"][0], "JSON");
    }
}
