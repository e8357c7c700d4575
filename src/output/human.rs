//! Human-readable output formatting

use crate::bridge::ScriptValue;
use crate::engine::value::format_number;
use crate::output::formatter::Output;

pub fn format_human(output: &Output) -> String {
    match output {
        // top-level strings print bare
        Output::Value(ScriptValue::String(s)) => s.clone(),
        Output::Value(value) => render(value),
        Output::AllowList { profile, names } => {
            let title = format!("Allow-list ({} profile, {} names)", profile, names.len());
            let mut output = format!("{}\n{}\n", title, "-".repeat(title.len()));
            for row in names.chunks(4) {
                let cells: Vec<String> = row.iter().map(|n| format!("{:<20}", n)).collect();
                output.push_str(cells.join(" ").trim_end());
                output.push('\n');
            }
            output
        }
        Output::Check {
            path,
            outline,
            issues,
            passed,
        } => {
            let mut output = format!("Script: {}\nStatements: {}\n\n", path, outline.len());
            for line in outline {
                output.push_str(line);
                output.push('\n');
            }
            if !issues.is_empty() {
                output.push_str("\nValidation Notes:\n");
                for issue in issues {
                    output.push_str(&format!("  - {}\n", issue));
                }
            }
            output.push_str(if *passed { "\nOK\n" } else { "\nFAILED\n" });
            output
        }
        Output::Message(msg) => msg.clone(),
        Output::Empty => "".to_string(),
    }
}

/// Script-like rendering of a value
pub fn render(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Undefined => "undefined".to_string(),
        ScriptValue::Null => "null".to_string(),
        ScriptValue::Bool(b) => b.to_string(),
        ScriptValue::Number(n) => format_number(*n),
        ScriptValue::String(s) => quote(s),
        ScriptValue::Bytes(data) => {
            let items: Vec<String> = data.iter().map(u8::to_string).collect();
            format!("Uint8Array({}) [{}]", data.len(), items.join(", "))
        }
        ScriptValue::Array(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        ScriptValue::Object(map) if map.is_empty() => "{}".to_string(),
        ScriptValue::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}: {}", render_key(key), render(value)))
                .collect();
            format!("{{ {} }}", entries.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn render_key(key: &str) -> String {
    let plain = key
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c == '$' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if plain && !key.is_empty() {
        key.to_string()
    } else {
        quote(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::value::ObjectMap;
    use crate::security::Profile;

    #[test]
    fn test_top_level_string_is_bare() {
        assert_eq!(format_human(&Output::Value("hi".into())), "hi");
    }

    #[test]
    fn test_render_nested() {
        let mut map = ObjectMap::new();
        map.insert("a".to_string(), ScriptValue::Array(vec![1.0.into(), "x".into()]));
        map.insert("two words".to_string(), ScriptValue::Null);
        assert_eq!(render(&ScriptValue::Object(map)), r#"{ a: [1, "x"], "two words": null }"#);
        assert_eq!(render(&ScriptValue::Bytes(vec![1, 2])), "Uint8Array(2) [1, 2]");
        assert_eq!(render(&ScriptValue::Number(0.5)), "0.5");
    }

    #[test]
    fn test_allow_list_table() {
        let output = Output::AllowList {
            profile: Profile::Narrow,
            names: vec!["Date".into(), "Infinity".into(), "Math".into(), "NaN".into()],
        };
        let text = format_human(&output);
        assert!(text.starts_with("Allow-list (narrow profile, 4 names)"));
        assert!(text.contains("Math"));
    }

    #[test]
    fn test_check_report() {
        let output = Output::Check {
            path: "a.js".into(),
            outline: vec!["1. expression".into()],
            issues: vec!["WARNING (statement 1): 'x' is not visible".into()],
            passed: true,
        };
        let text = format_human(&output);
        assert!(text.contains("Statements: 1"));
        assert!(text.contains("Validation Notes:"));
        assert!(text.trim_end().ends_with("OK"));
    }
}
