//! `String` and `String.prototype`
//!
//! Indices count Unicode scalar values.

use super::{arg, define_method, relative_index, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{Exception, NativeFunction, Value};

/// Longest string `repeat` and `padStart` may produce
const MAX_STRING_LENGTH: usize = 1 << 24;

pub fn install(realm: &Realm) {
    let string = NativeFunction::new("String", |_, _, args| {
        Ok(Value::from(match args.first() {
            Some(value) => value.to_display_string(),
            None => String::new(),
        }))
    });
    let string = with_prototype(string, &realm.prototypes().string).with_property(
        "fromCharCode",
        NativeFunction::new("fromCharCode", |_, _, args| {
            let text: String = args
                .iter()
                .map(|v| char::from_u32(v.to_uint32() & 0xFFFF).unwrap_or('\u{FFFD}'))
                .collect();
            Ok(Value::from(text))
        })
        .into_value(),
    );
    realm.define_global("String", string.into_value());

    install_prototype(realm);
}

fn this_string(interp: &Interpreter, this: &Value, method: &str) -> Result<String, Exception> {
    match this {
        Value::String(s) => Ok(s.to_string()),
        Value::Undefined | Value::Null => Err(interp.type_error(format!(
            "String.prototype.{} called on {}",
            method,
            this.kind_name()
        ))),
        other => Ok(other.to_display_string()),
    }
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// Char index of a substring, searching from char index `from`
fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn install_prototype(realm: &Realm) {
    let proto = &realm.prototypes().string;

    define_method(proto, "toString", |interp, this, _| Ok(Value::from(this_string(interp, &this, "toString")?)));
    define_method(proto, "valueOf", |interp, this, _| Ok(Value::from(this_string(interp, &this, "valueOf")?)));

    define_method(proto, "charAt", |interp, this, args| {
        let s = this_string(interp, &this, "charAt")?;
        let index = arg(&args, 0).to_integer();
        if index < 0.0 {
            return Ok(Value::from(""));
        }
        Ok(Value::from(
            s.chars().nth(index as usize).map(String::from).unwrap_or_default(),
        ))
    });
    define_method(proto, "charCodeAt", |interp, this, args| {
        let s = this_string(interp, &this, "charCodeAt")?;
        let index = arg(&args, 0).to_integer();
        if index < 0.0 {
            return Ok(Value::Number(f64::NAN));
        }
        Ok(Value::Number(
            s.chars().nth(index as usize).map(|c| c as u32 as f64).unwrap_or(f64::NAN),
        ))
    });
    define_method(proto, "at", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "at")?);
        let n = arg(&args, 0).to_integer();
        let index = if n < 0.0 { s.len() as f64 + n } else { n };
        if index < 0.0 {
            return Ok(Value::Undefined);
        }
        Ok(s.get(index as usize).map(|c| Value::from(c.to_string())).unwrap_or_default())
    });

    define_method(proto, "indexOf", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "indexOf")?);
        let needle = chars(&arg(&args, 0).to_display_string());
        let from = arg(&args, 1).to_integer().max(0.0) as usize;
        Ok(Value::Number(
            find_from(&s, &needle, from).map(|i| i as f64).unwrap_or(-1.0),
        ))
    });
    define_method(proto, "lastIndexOf", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "lastIndexOf")?);
        let needle = chars(&arg(&args, 0).to_display_string());
        if needle.len() > s.len() {
            return Ok(Value::Number(-1.0));
        }
        let found = (0..=s.len() - needle.len())
            .rev()
            .find(|&i| s[i..i + needle.len()] == *needle);
        Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
    });
    define_method(proto, "includes", |interp, this, args| {
        let s = this_string(interp, &this, "includes")?;
        Ok(Value::Bool(s.contains(&arg(&args, 0).to_display_string())))
    });
    define_method(proto, "startsWith", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "startsWith")?);
        let prefix = chars(&arg(&args, 0).to_display_string());
        let at = relative_index(&arg(&args, 1), s.len(), 0);
        Ok(Value::Bool(s[at..].starts_with(&prefix)))
    });
    define_method(proto, "endsWith", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "endsWith")?);
        let suffix = chars(&arg(&args, 0).to_display_string());
        let end = relative_index(&arg(&args, 1), s.len(), s.len());
        Ok(Value::Bool(s[..end].ends_with(&suffix)))
    });

    define_method(proto, "slice", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "slice")?);
        let start = relative_index(&arg(&args, 0), s.len(), 0);
        let end = relative_index(&arg(&args, 1), s.len(), s.len());
        Ok(Value::from(
            s.get(start..end.max(start)).map(|c| c.iter().collect::<String>()).unwrap_or_default(),
        ))
    });
    define_method(proto, "substring", |interp, this, args| {
        let s = chars(&this_string(interp, &this, "substring")?);
        let clamp = |v: Value, default: usize| match v {
            Value::Undefined => default,
            v => (v.to_integer().max(0.0) as usize).min(s.len()),
        };
        let a = clamp(arg(&args, 0), 0);
        let b = clamp(arg(&args, 1), s.len());
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(Value::from(s[start..end].iter().collect::<String>()))
    });

    define_method(proto, "toUpperCase", |interp, this, _| {
        Ok(Value::from(this_string(interp, &this, "toUpperCase")?.to_uppercase()))
    });
    define_method(proto, "toLowerCase", |interp, this, _| {
        Ok(Value::from(this_string(interp, &this, "toLowerCase")?.to_lowercase()))
    });
    define_method(proto, "trim", |interp, this, _| {
        Ok(Value::from(this_string(interp, &this, "trim")?.trim()))
    });
    define_method(proto, "trimStart", |interp, this, _| {
        Ok(Value::from(this_string(interp, &this, "trimStart")?.trim_start()))
    });
    define_method(proto, "trimEnd", |interp, this, _| {
        Ok(Value::from(this_string(interp, &this, "trimEnd")?.trim_end()))
    });

    define_method(proto, "split", |interp, this, args| {
        let s = this_string(interp, &this, "split")?;
        let limit = match arg(&args, 1) {
            Value::Undefined => usize::MAX,
            v => v.to_uint32() as usize,
        };
        let parts: Vec<Value> = match arg(&args, 0) {
            Value::Undefined => vec![Value::from(s)],
            separator => {
                let separator = separator.to_display_string();
                if separator.is_empty() {
                    s.chars().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::from).collect()
                }
            }
        };
        Ok(Value::array(parts.into_iter().take(limit).collect()))
    });
    define_method(proto, "concat", |interp, this, args| {
        let mut s = this_string(interp, &this, "concat")?;
        for value in &args {
            s.push_str(&value.to_display_string());
        }
        Ok(Value::from(s))
    });
    define_method(proto, "repeat", |interp, this, args| {
        let s = this_string(interp, &this, "repeat")?;
        let count = arg(&args, 0).to_number();
        let count = if count.is_nan() { 0.0 } else { count.trunc() };
        if count < 0.0 || !count.is_finite() {
            return Err(interp.range_error(format!("Invalid count value: {}", count)));
        }
        if s.len() as f64 * count > MAX_STRING_LENGTH as f64 {
            return Err(interp.range_error("Invalid string length"));
        }
        Ok(Value::from(s.repeat(count as usize)))
    });
    define_method(proto, "padStart", |interp, this, args| {
        let s = this_string(interp, &this, "padStart")?;
        let padding = pad(interp, &s, &args)?;
        Ok(Value::from(padding + &s))
    });
    define_method(proto, "padEnd", |interp, this, args| {
        let s = this_string(interp, &this, "padEnd")?;
        let padding = pad(interp, &s, &args)?;
        Ok(Value::from(s + &padding))
    });
    define_method(proto, "replace", |interp, this, args| replace(interp, this, args, false));
    define_method(proto, "replaceAll", |interp, this, args| replace(interp, this, args, true));
}

fn pad(interp: &Interpreter, s: &str, args: &[Value]) -> Result<String, Exception> {
    let target = arg(args, 0).to_integer().max(0.0) as usize;
    if target > MAX_STRING_LENGTH {
        return Err(interp.range_error("Invalid string length"));
    }
    let filler: Vec<char> = match arg(args, 1) {
        Value::Undefined => vec![' '],
        v => chars(&v.to_display_string()),
    };
    let current = s.chars().count();
    if target <= current || filler.is_empty() {
        return Ok(String::new());
    }
    Ok(filler.iter().cycle().take(target - current).collect())
}

/// String pattern replacement; a function replacement receives the match,
/// its offset and the whole string
fn replace(interp: &mut Interpreter, this: Value, args: Vec<Value>, all: bool) -> Result<Value, Exception> {
    let s = this_string(interp, &this, if all { "replaceAll" } else { "replace" })?;
    let pattern = arg(&args, 0).to_display_string();
    let replacement = arg(&args, 1);

    let mut matches: Vec<usize> = Vec::new();
    if pattern.is_empty() {
        matches.push(0);
    } else if all {
        matches.extend(s.match_indices(pattern.as_str()).map(|(i, _)| i));
    } else if let Some(i) = s.find(pattern.as_str()) {
        matches.push(i);
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for offset in matches {
        out.push_str(&s[last..offset]);
        let substitute = if replacement.is_callable() {
            let char_offset = s[..offset].chars().count();
            interp
                .call_value(
                    &replacement,
                    Value::Undefined,
                    vec![
                        Value::from(pattern.as_str()),
                        Value::Number(char_offset as f64),
                        Value::from(s.as_str()),
                    ],
                )?
                .to_display_string()
        } else {
            replacement.to_display_string().replace("$&", &pattern)
        };
        out.push_str(&substitute);
        last = offset + pattern.len();
    }
    out.push_str(&s[last..]);
    Ok(Value::from(out))
}
