//! The `Math` namespace

use rand::Rng;

use super::{arg, define_method, define_value};
use crate::engine::realm::Realm;
use crate::engine::value::Value;

pub fn install(realm: &Realm) {
    let math = realm.new_object();

    for (name, value) in [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ] {
        define_value(&math, name, Value::Number(value));
    }

    let unary: [(&str, fn(f64) -> f64); 21] = [
        ("abs", f64::abs),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("round", round),
        ("trunc", f64::trunc),
        ("sign", sign),
        ("sqrt", f64::sqrt),
        ("cbrt", f64::cbrt),
        ("exp", f64::exp),
        ("expm1", f64::exp_m1),
        ("log", f64::ln),
        ("log2", f64::log2),
        ("log10", f64::log10),
        ("log1p", f64::ln_1p),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("fround", |x| x as f32 as f64),
    ];
    for (name, op) in unary {
        define_method(&math, name, move |_, _, args| {
            Ok(Value::Number(op(arg(&args, 0).to_number())))
        });
    }

    define_method(&math, "atan2", |_, _, args| {
        Ok(Value::Number(arg(&args, 0).to_number().atan2(arg(&args, 1).to_number())))
    });
    define_method(&math, "pow", |_, _, args| {
        Ok(Value::Number(pow(arg(&args, 0).to_number(), arg(&args, 1).to_number())))
    });
    define_method(&math, "max", |_, _, args| {
        Ok(Value::Number(fold(&args, f64::NEG_INFINITY, f64::max)))
    });
    define_method(&math, "min", |_, _, args| {
        Ok(Value::Number(fold(&args, f64::INFINITY, f64::min)))
    });
    define_method(&math, "hypot", |_, _, args| {
        let sum: f64 = args.iter().map(|v| v.to_number().powi(2)).sum();
        Ok(Value::Number(sum.sqrt()))
    });
    define_method(&math, "random", |_, _, _| {
        Ok(Value::Number(rand::thread_rng().gen::<f64>()))
    });

    realm.define_global("Math", Value::Object(math));
}

/// Rounds half up, towards positive infinity
fn round(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    (x + 0.5).floor()
}

fn sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else {
        x.signum()
    }
}

/// `**` and `Math.pow`: `1 ** NaN` and `(±1) ** ±Infinity` are NaN
pub fn pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// NaN in any argument poisons the result
fn fold(args: &[Value], init: f64, op: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = op(acc, n);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtins::test_support::{eval_number, eval_string};

    #[test]
    fn test_round_half_up() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert_eq!(round(-2.6), -3.0);
    }

    #[test]
    fn test_pow_edge_cases() {
        assert!(pow(1.0, f64::NAN).is_nan());
        assert!(pow(-1.0, f64::INFINITY).is_nan());
        assert_eq!(pow(2.0, 10.0), 1024.0);
    }

    #[test]
    fn test_math_from_script() {
        assert_eq!(eval_number("Math.max(1, 5, 3) + Math.min(4, 2)"), 7.0);
        assert_eq!(eval_number("Math.max()"), f64::NEG_INFINITY);
        assert!(eval_number("Math.max(1, 'x')").is_nan());
        assert_eq!(eval_number("Math.floor(Math.PI * 100)"), 314.0);
        assert_eq!(eval_number("Math.hypot(3, 4)"), 5.0);
        assert_eq!(eval_number("Math.sign(-3)"), -1.0);
    }

    #[test]
    fn test_random_in_unit_interval() {
        assert_eq!(eval_string("const r = Math.random(); r >= 0 && r < 1"), "true");
    }
}
