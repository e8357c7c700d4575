//! `Number` and `Number.prototype`

use super::{arg, define_method, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{format_number, Exception, NativeFunction, Value};

use super::globals::{parse_float, parse_int};

pub fn install(realm: &Realm) {
    let number = NativeFunction::new("Number", |_, _, args| {
        Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))
    });
    let mut number = with_prototype(number, &realm.prototypes().number);
    for (name, value) in [
        ("MAX_SAFE_INTEGER", 9007199254740991.0),
        ("MIN_SAFE_INTEGER", -9007199254740991.0),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("EPSILON", f64::EPSILON),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ] {
        number = number.with_property(name, Value::Number(value));
    }
    let number = number
        .with_property(
            "isInteger",
            NativeFunction::new("isInteger", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
            })
            .into_value(),
        )
        .with_property(
            "isSafeInteger",
            NativeFunction::new("isSafeInteger", |_, _, args| {
                Ok(Value::Bool(matches!(
                    arg(&args, 0),
                    Value::Number(n) if n.fract() == 0.0 && n.abs() <= 9007199254740991.0
                )))
            })
            .into_value(),
        )
        .with_property(
            "isFinite",
            NativeFunction::new("isFinite", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))
            })
            .into_value(),
        )
        .with_property(
            "isNaN",
            NativeFunction::new("isNaN", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))
            })
            .into_value(),
        )
        .with_property(
            "parseFloat",
            NativeFunction::new("parseFloat", |_, _, args| {
                Ok(Value::Number(parse_float(&arg(&args, 0).to_display_string())))
            })
            .into_value(),
        )
        .with_property(
            "parseInt",
            NativeFunction::new("parseInt", |_, _, args| {
                Ok(Value::Number(parse_int(&arg(&args, 0).to_display_string(), &arg(&args, 1))))
            })
            .into_value(),
        );
    realm.define_global("Number", number.into_value());

    let proto = &realm.prototypes().number;
    define_method(proto, "toString", |interp, this, args| {
        let n = this_number(interp, &this)?;
        match arg(&args, 0) {
            Value::Undefined => Ok(Value::from(format_number(n))),
            radix => {
                let radix = radix.to_integer();
                if !(2.0..=36.0).contains(&radix) {
                    return Err(interp.range_error("toString() radix must be between 2 and 36"));
                }
                Ok(Value::from(to_radix(n, radix as u32)))
            }
        }
    });
    define_method(proto, "toFixed", |interp, this, args| {
        let n = this_number(interp, &this)?;
        let digits = arg(&args, 0).to_integer();
        if !(0.0..=100.0).contains(&digits) {
            return Err(interp.range_error("toFixed() digits argument must be between 0 and 100"));
        }
        if !n.is_finite() || n.abs() >= 1e21 {
            return Ok(Value::from(format_number(n)));
        }
        Ok(Value::from(format!("{:.*}", digits as usize, n)))
    });
    define_method(proto, "valueOf", |interp, this, _| Ok(Value::Number(this_number(interp, &this)?)));
}

fn this_number(interp: &Interpreter, this: &Value) -> Result<f64, Exception> {
    match this {
        Value::Number(n) => Ok(*n),
        other => Err(interp.type_error(format!(
            "Number.prototype method called on {}",
            other.kind_name()
        ))),
    }
}

/// Integer part in the given radix; fractions are only kept for radix 10
fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return format_number(n);
    }
    let negative = n < 0.0;
    let mut value = n.abs().trunc();
    if value == 0.0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value >= 1.0 {
        let digit = (value % radix as f64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value = (value / radix as f64).trunc();
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::to_radix;
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_number_conversion() {
        assert_eq!(eval_number("Number('42') + Number(true)"), 43.0);
        assert!(eval_number("Number('x')").is_nan());
        assert_eq!(eval_number("Number()"), 0.0);
    }

    #[test]
    fn test_number_statics() {
        assert_eq!(eval_string("Number.isInteger(5) && !Number.isInteger(5.5)"), "true");
        assert_eq!(eval_string("Number.isNaN(NaN) && !Number.isNaN('x')"), "true");
        assert_eq!(eval_number("Number.MAX_SAFE_INTEGER"), 9007199254740991.0);
        assert_eq!(eval_number("Number.parseInt('ff', 16)"), 255.0);
    }

    #[test]
    fn test_to_fixed_and_to_string() {
        assert_eq!(eval_string("(3.14159).toFixed(2)"), "3.14");
        assert_eq!(eval_string("(255).toString(16)"), "ff");
        assert_eq!(eval_string("(-5).toString(2)"), "-101");
        assert!(eval("(1).toString(1)").is_err());
    }

    #[test]
    fn test_to_radix() {
        assert_eq!(to_radix(0.0, 2), "0");
        assert_eq!(to_radix(35.0, 36), "z");
        assert_eq!(to_radix(10.5, 10), "10.5");
    }
}
