//! `Date`, backed by chrono. All dates are UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};

use super::{arg, define_method, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{Exception, NativeFunction, ObjectKind, Value};

/// Largest representable distance from the epoch, in milliseconds
const MAX_TIME: f64 = 8.64e15;

const MS_PER_DAY: f64 = 86_400_000.0;

pub fn install(realm: &Realm) {
    let date = NativeFunction::new("Date", |_, _, _| Ok(Value::from(format_date(now()))))
        .with_constructor(construct);
    let date = with_prototype(date, &realm.prototypes().date)
        .with_property(
            "now",
            NativeFunction::new("now", |_, _, _| Ok(Value::Number(now()))).into_value(),
        )
        .with_property(
            "parse",
            NativeFunction::new("parse", |_, _, args| {
                Ok(Value::Number(parse(&arg(&args, 0).to_display_string())))
            })
            .into_value(),
        )
        .with_property(
            "UTC",
            NativeFunction::new("UTC", |_, _, args| Ok(Value::Number(from_components(&args)))).into_value(),
        );
    realm.define_global("Date", date.into_value());

    install_prototype(realm);
}

fn construct(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let time = match args.as_slice() {
        [] => now(),
        [Value::String(s)] => parse(s),
        [Value::Object(object)] => match object.borrow().kind {
            ObjectKind::Date(t) => t,
            _ => f64::NAN,
        },
        [single] => time_clip(single.to_number()),
        _ => from_components(&args),
    };
    Ok(interp.realm().new_date(time))
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        return f64::NAN;
    }
    t.trunc()
}

/// Milliseconds for `(year, month, day?, hours?, minutes?, seconds?, ms?)`;
/// out-of-range fields carry over like the script `Date.UTC`
fn from_components(args: &[Value]) -> f64 {
    let field = |i: usize, default: f64| match args.get(i) {
        Some(v) => v.to_number(),
        None => default,
    };
    let fields = [
        field(0, f64::NAN),
        field(1, 0.0),
        field(2, 1.0),
        field(3, 0.0),
        field(4, 0.0),
        field(5, 0.0),
        field(6, 0.0),
    ];
    if fields.iter().any(|f| !f.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = fields.map(f64::trunc);
    let year = if (0.0..=99.0).contains(&year) { 1900.0 + year } else { year };

    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    if year.abs() > 300_000.0 {
        return f64::NAN;
    }
    let Some(first) = NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1) else {
        return f64::NAN;
    };
    let epoch_days = first.signed_duration_since(epoch()).num_days() as f64;
    let days = epoch_days + day - 1.0;
    time_clip(days * MS_PER_DAY + hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1000.0 + millis)
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Accepts RFC 3339, RFC 2822 and the ISO date-only and local-time forms
pub fn parse(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return time_clip(dt.and_utc().timestamp_millis() as f64);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let days = date.signed_duration_since(epoch()).num_days() as f64;
        return time_clip(days * MS_PER_DAY);
    }
    f64::NAN
}

fn to_datetime(t: f64) -> Option<DateTime<Utc>> {
    if t.is_nan() {
        return None;
    }
    DateTime::from_timestamp_millis(t as i64)
}

/// `toISOString` form; `None` for an invalid date
pub fn to_iso_string(t: f64) -> Option<String> {
    to_datetime(t).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// `String(date)` form
pub fn format_date(t: f64) -> String {
    match to_datetime(t) {
        Some(dt) => dt
            .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
            .to_string(),
        None => "Invalid Date".to_string(),
    }
}

fn this_time(interp: &Interpreter, this: &Value) -> Result<f64, Exception> {
    if let Value::Object(object) = this {
        if let ObjectKind::Date(t) = object.borrow().kind {
            return Ok(t);
        }
    }
    Err(interp.type_error("this is not a Date object."))
}

fn install_prototype(realm: &Realm) {
    let proto = &realm.prototypes().date;

    let getters: [(&str, fn(&DateTime<Utc>) -> f64); 8] = [
        ("getFullYear", |d| d.year() as f64),
        ("getMonth", |d| d.month0() as f64),
        ("getDate", |d| d.day() as f64),
        ("getDay", |d| d.weekday().num_days_from_sunday() as f64),
        ("getHours", |d| d.hour() as f64),
        ("getMinutes", |d| d.minute() as f64),
        ("getSeconds", |d| d.second() as f64),
        ("getMilliseconds", |d| d.timestamp_subsec_millis() as f64),
    ];
    for (name, getter) in getters {
        let method = move |interp: &mut Interpreter, this: Value, _args: Vec<Value>| {
            let t = this_time(interp, &this)?;
            Ok(Value::Number(to_datetime(t).map(|d| getter(&d)).unwrap_or(f64::NAN)))
        };
        define_method(proto, name, method);
        define_method(proto, &name.replacen("get", "getUTC", 1), method);
    }

    define_method(proto, "getTime", |interp, this, _| Ok(Value::Number(this_time(interp, &this)?)));
    define_method(proto, "valueOf", |interp, this, _| Ok(Value::Number(this_time(interp, &this)?)));
    define_method(proto, "getTimezoneOffset", |interp, this, _| {
        this_time(interp, &this)?;
        Ok(Value::Number(0.0))
    });
    define_method(proto, "toISOString", |interp, this, _| {
        let t = this_time(interp, &this)?;
        to_iso_string(t)
            .map(Value::from)
            .ok_or_else(|| interp.range_error("Invalid time value"))
    });
    define_method(proto, "toJSON", |interp, this, _| {
        let t = this_time(interp, &this)?;
        Ok(to_iso_string(t).map(Value::from).unwrap_or(Value::Null))
    });
    define_method(proto, "toUTCString", |interp, this, _| {
        let t = this_time(interp, &this)?;
        Ok(Value::from(match to_datetime(t) {
            Some(dt) => dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            None => "Invalid Date".to_string(),
        }))
    });
    define_method(proto, "toString", |interp, this, _| {
        Ok(Value::from(format_date(this_time(interp, &this)?)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse("1970-01-02T00:00:00Z"), MS_PER_DAY);
        assert_eq!(parse("1970-01-02"), MS_PER_DAY);
        assert_eq!(parse("2000-01-01T00:00:00.500+01:00"), 946681200500.0);
        assert!(parse("not a date").is_nan());
    }

    #[test]
    fn test_components_carry_over() {
        let args = [Value::Number(2020.0), Value::Number(12.0), Value::Number(1.0)];
        assert_eq!(from_components(&args), parse("2021-01-01"));
        let args = [Value::Number(99.0), Value::Number(0.0)];
        assert_eq!(from_components(&args), parse("1999-01-01"));
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(0.0), "Thu Jan 01 1970 00:00:00 GMT+0000 (Coordinated Universal Time)");
        assert_eq!(format_date(f64::NAN), "Invalid Date");
    }

    #[test]
    fn test_date_from_script() {
        assert_eq!(eval_string("new Date(0).toISOString()"), "1970-01-01T00:00:00.000Z");
        assert_eq!(eval_number("new Date(Date.UTC(2024, 1, 29)).getUTCDate()"), 29.0);
        assert_eq!(eval_number("new Date('2024-03-05T10:20:30Z').getHours()"), 10.0);
        assert_eq!(eval_number("new Date(86400000).getDay()"), 5.0);
        assert_eq!(eval_number("new Date(2000, 0, 1) - new Date(1999, 11, 31)"), MS_PER_DAY);
    }

    #[test]
    fn test_invalid_date() {
        assert_eq!(eval_string("String(new Date('garbage'))"), "Invalid Date");
        assert!(eval("new Date('garbage').toISOString()").is_err());
        assert_eq!(eval_string("new Date(NaN).toJSON()"), "null");
    }

    #[test]
    fn test_now_is_recent() {
        assert!(eval_number("Date.now()") > 1.6e12);
    }
}
