//! Global functions and host-only globals

use tracing::{debug, error, info, warn};

use super::{arg, define_method};
use crate::engine::realm::Realm;
use crate::engine::value::{NativeFunction, Value};

pub fn install(realm: &Realm) {
    realm.define_global("NaN", Value::Number(f64::NAN));
    realm.define_global("Infinity", Value::Number(f64::INFINITY));

    realm.define_global(
        "parseInt",
        NativeFunction::new("parseInt", |_, _, args| {
            Ok(Value::Number(parse_int(&arg(&args, 0).to_display_string(), &arg(&args, 1))))
        })
        .into_value(),
    );
    realm.define_global(
        "parseFloat",
        NativeFunction::new("parseFloat", |_, _, args| {
            Ok(Value::Number(parse_float(&arg(&args, 0).to_display_string())))
        })
        .into_value(),
    );
    realm.define_global(
        "isNaN",
        NativeFunction::new("isNaN", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))
        })
        .into_value(),
    );
    realm.define_global(
        "isFinite",
        NativeFunction::new("isFinite", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_finite()))
        })
        .into_value(),
    );

    let boolean = NativeFunction::new("Boolean", |_, _, args| Ok(Value::Bool(arg(&args, 0).truthy())));
    realm.define_global(
        "Boolean",
        super::with_prototype(boolean, &realm.prototypes().boolean).into_value(),
    );
    define_method(&realm.prototypes().boolean, "toString", |_, this, _| {
        Ok(Value::from(this.to_display_string()))
    });
    define_method(&realm.prototypes().boolean, "valueOf", |_, this, _| Ok(this));

    for (name, component) in [("encodeURIComponent", true), ("encodeURI", false)] {
        realm.define_global(
            name,
            NativeFunction::new(name, move |_, _, args| {
                Ok(Value::from(encode_uri(&arg(&args, 0).to_display_string(), component)))
            })
            .into_value(),
        );
    }
    for name in ["decodeURIComponent", "decodeURI"] {
        realm.define_global(
            name,
            NativeFunction::new(name, |interp, _, args| {
                let text = arg(&args, 0).to_display_string();
                decode_uri(&text)
                    .map(Value::from)
                    .ok_or_else(|| interp.error("URIError", "URI malformed"))
            })
            .into_value(),
        );
    }

    install_console(realm);
}

/// `console` and `print` write to the host; they exist only in the realm and
/// are never part of an allow-list profile
fn install_console(realm: &Realm) {
    let console = realm.new_object();
    define_method(&console, "log", |_, _, args| {
        info!(target: "scriptit::script", "{}", join_args(&args));
        Ok(Value::Undefined)
    });
    define_method(&console, "info", |_, _, args| {
        info!(target: "scriptit::script", "{}", join_args(&args));
        Ok(Value::Undefined)
    });
    define_method(&console, "debug", |_, _, args| {
        debug!(target: "scriptit::script", "{}", join_args(&args));
        Ok(Value::Undefined)
    });
    define_method(&console, "warn", |_, _, args| {
        warn!(target: "scriptit::script", "{}", join_args(&args));
        Ok(Value::Undefined)
    });
    define_method(&console, "error", |_, _, args| {
        error!(target: "scriptit::script", "{}", join_args(&args));
        Ok(Value::Undefined)
    });
    realm.define_global("console", Value::Object(console));

    realm.define_global(
        "print",
        NativeFunction::new("print", |_, _, args| {
            println!("{}", join_args(&args));
            Ok(Value::Undefined)
        })
        .into_value(),
    );
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_display_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `parseInt` semantics: optional sign, optional `0x`, longest digit prefix
pub fn parse_int(text: &str, radix: &Value) -> f64 {
    let mut s = text.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = match radix {
        Value::Undefined => 0,
        r => r.to_int32(),
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    if (radix == 0 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }

    let mut result: Option<f64> = None;
    for c in s.chars() {
        match c.to_digit(radix as u32) {
            Some(d) => result = Some(result.unwrap_or(0.0) * radix as f64 + d as f64),
            None => break,
        }
    }
    result.map(|r| sign * r).unwrap_or(f64::NAN)
}

/// `parseFloat` semantics: longest numeric prefix
pub fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for (prefix, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(prefix) {
            return value;
        }
    }

    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

const URI_UNRESERVED: &str = "-_.!~*'()";
const URI_RESERVED: &str = ";/?:@&=+$,#";

fn encode_uri(text: &str, component: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let keep = c.is_ascii_alphanumeric()
            || URI_UNRESERVED.contains(c)
            || (!component && URI_RESERVED.contains(c));
        if keep {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", b));
            }
        }
    }
    out
}

fn decode_uri(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
