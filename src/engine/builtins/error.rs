//! Error constructors

use super::{arg, define_method, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::{Realm, ERROR_NAMES};
use crate::engine::value::{Exception, NativeFunction, Value};

pub fn install(realm: &Realm) {
    for name in ERROR_NAMES {
        let make = move |interp: &mut Interpreter, _this: Value, args: Vec<Value>| {
            build_error(interp, name, &args)
        };
        let constructor = NativeFunction::new(name, make).with_constructor(make);
        let constructor = with_prototype(constructor, &realm.prototypes().errors[name]);
        realm.define_global(name, constructor.into_value());
    }

    define_method(&realm.prototypes().errors["Error"], "toString", |interp, this, _| {
        let name = match interp.get_property(&this, "name")? {
            Value::Undefined => "Error".to_string(),
            other => other.to_display_string(),
        };
        let message = match interp.get_property(&this, "message")? {
            Value::Undefined => String::new(),
            other => other.to_display_string(),
        };
        Ok(Value::from(match (name.is_empty(), message.is_empty()) {
            (_, true) => name,
            (true, false) => message,
            (false, false) => format!("{}: {}", name, message),
        }))
    });
}

fn build_error(interp: &mut Interpreter, name: &str, args: &[Value]) -> Result<Value, Exception> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => other.to_display_string(),
    };
    let error = interp.realm().make_error(name, &message);
    // The prototype already carries the name
    if let Value::Object(object) = &error {
        object.borrow_mut().properties.remove("name");
    }
    if let Value::Object(options) = arg(args, 1) {
        if let Some(cause) = options.borrow().properties.get("cause") {
            interp.set_property(&error, "cause", cause.clone())?;
        }
    }
    Ok(error)
}

#[cfg(test)]
mod tests {
    use crate::engine::builtins::test_support::{eval, eval_string};

    #[test]
    fn test_error_construction() {
        assert_eq!(eval_string("new Error('boom').message"), "boom");
        assert_eq!(eval_string("TypeError('bad').name"), "TypeError");
        assert_eq!(eval_string("String(new RangeError('far'))"), "RangeError: far");
    }

    #[test]
    fn test_error_instanceof_chain() {
        assert_eq!(eval_string("new TypeError('x') instanceof Error"), "true");
        assert_eq!(eval_string("new Error('x') instanceof TypeError"), "false");
    }

    #[test]
    fn test_thrown_error_is_caught() {
        assert_eq!(
            eval_string("try { throw new SyntaxError('nope') } catch (e) { e.toString() }"),
            "SyntaxError: nope"
        );
        let err = eval("throw new Error('top')").unwrap_err();
        assert_eq!(err.to_string(), "Error: top");
    }

    #[test]
    fn test_error_cause() {
        assert_eq!(eval_string("new Error('outer', {cause: 'inner'}).cause"), "inner");
    }
}
