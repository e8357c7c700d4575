//! `Object` and `Function` built-ins

use super::{arg, define_method, define_value, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{Exception, NativeFunction, Object, Value};

pub fn install(realm: &Realm) {
    let protos = realm.prototypes();

    let object = NativeFunction::new("Object", construct_object).with_constructor(construct_object);
    let object = with_prototype(object, &protos.object);
    {
        let mut props = object.properties.borrow_mut();
        props.insert("keys", NativeFunction::new("keys", keys).into_value());
        props.insert("values", NativeFunction::new("values", values).into_value());
        props.insert("entries", NativeFunction::new("entries", entries).into_value());
        props.insert("assign", NativeFunction::new("assign", assign).into_value());
        props.insert("fromEntries", NativeFunction::new("fromEntries", from_entries).into_value());
        props.insert("create", NativeFunction::new("create", create).into_value());
        props.insert(
            "getPrototypeOf",
            NativeFunction::new("getPrototypeOf", |interp, _, args| {
                Ok(interp
                    .realm()
                    .prototype_of(&arg(&args, 0))
                    .map(Value::Object)
                    .unwrap_or(Value::Null))
            })
            .into_value(),
        );
        props.insert(
            "freeze",
            NativeFunction::new("freeze", |_, _, args| Ok(arg(&args, 0))).into_value(),
        );
        props.insert(
            "hasOwn",
            NativeFunction::new("hasOwn", |interp, _, args| {
                let key = arg(&args, 1).to_display_string();
                Ok(Value::Bool(interp.own_keys(&arg(&args, 0)).contains(&key)))
            })
            .into_value(),
        );
    }
    realm.define_global("Object", object.into_value());

    define_method(&protos.object, "hasOwnProperty", |interp, this, args| {
        let key = arg(&args, 0).to_display_string();
        Ok(Value::Bool(interp.own_keys(&this).contains(&key)))
    });
    define_method(&protos.object, "toString", |_, this, _| {
        Ok(Value::from(match this {
            Value::Object(_) => "[object Object]".to_string(),
            other => other.to_display_string(),
        }))
    });
    define_method(&protos.object, "valueOf", |_, this, _| Ok(this));

    install_function(realm);
}

fn construct_object(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    match arg(&args, 0) {
        Value::Undefined | Value::Null => Ok(Value::Object(interp.realm().new_object())),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            Err(interp.type_error("Primitive wrapper objects are not supported"))
        }
        other => Ok(other),
    }
}

fn keys(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let target = require_object(interp, &arg(&args, 0))?;
    Ok(Value::array(
        interp.own_keys(&target).into_iter().map(Value::from).collect(),
    ))
}

fn values(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let target = require_object(interp, &arg(&args, 0))?;
    Ok(Value::array(
        interp.own_entries(&target).into_iter().map(|(_, v)| v).collect(),
    ))
}

fn entries(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let target = require_object(interp, &arg(&args, 0))?;
    Ok(Value::array(
        interp
            .own_entries(&target)
            .into_iter()
            .map(|(k, v)| Value::array(vec![Value::from(k), v]))
            .collect(),
    ))
}

fn assign(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let target = require_object(interp, &arg(&args, 0))?;
    for source in args.iter().skip(1) {
        for (key, value) in interp.own_entries(source) {
            interp.set_property(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn from_entries(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let object = interp.realm().new_object();
    for entry in interp.iterate(&arg(&args, 0))? {
        let key = interp.get_property(&entry, "0")?.to_display_string();
        let value = interp.get_property(&entry, "1")?;
        object.borrow_mut().properties.insert(key, value);
    }
    Ok(Value::Object(object))
}

fn create(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let prototype = match arg(&args, 0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        _ => return Err(interp.type_error("Object prototype may only be an Object or null")),
    };
    Ok(Value::Object(Object::new(prototype).into_ref()))
}

fn require_object(interp: &Interpreter, value: &Value) -> Result<Value, Exception> {
    if value.is_nullish() {
        return Err(interp.type_error("Cannot convert undefined or null to object"));
    }
    Ok(value.clone())
}

// ============================================================================
// Function.prototype
// ============================================================================

fn install_function(realm: &Realm) {
    let proto = &realm.prototypes().function;

    define_method(proto, "call", |interp, this, args| {
        let mut args = args.into_iter();
        let this_arg = args.next().unwrap_or_default();
        interp.call_value(&this, this_arg, args.collect())
    });

    define_method(proto, "apply", |interp, this, args| {
        let this_arg = arg(&args, 0);
        let call_args = match arg(&args, 1) {
            Value::Undefined | Value::Null => Vec::new(),
            list => interp.iterate(&list)?,
        };
        interp.call_value(&this, this_arg, call_args)
    });

    define_method(proto, "bind", |interp, this, args| {
        if !this.is_callable() {
            return Err(interp.type_error("Bind must be called on a function"));
        }
        let mut args = args.into_iter();
        let bound_this = args.next().unwrap_or_default();
        let bound_args: Vec<Value> = args.collect();
        let target = this.clone();
        let name = format!("bound {}", interp.get_property(&this, "name")?.to_display_string());
        Ok(NativeFunction::new(name, move |interp, _, args| {
            let mut all = bound_args.clone();
            all.extend(args);
            interp.call_value(&target, bound_this.clone(), all)
        })
        .into_value())
    });

    define_method(proto, "toString", |_, this, _| Ok(Value::from(this.to_display_string())));

    let function = NativeFunction::new("Function", |interp, _, _| {
        Err(interp.error("EvalError", "Code generation from strings is disallowed"))
    });
    realm.define_global("Function", with_prototype(function, proto).into_value());
    define_value(proto, "length", Value::Number(0.0));
}

#[cfg(test)]
mod tests {
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_object_keys_values_entries() {
        assert_eq!(eval_string("Object.keys({a: 1, b: 2}).join()"), "a,b");
        assert_eq!(eval_number("Object.values({a: 1, b: 2}).reduce((s, x) => s + x, 0)"), 3.0);
        assert_eq!(eval_string("Object.entries({a: 1}).map(e => e.join('=')).join()"), "a=1");
    }

    #[test]
    fn test_object_assign_and_from_entries() {
        assert_eq!(eval_number("Object.assign({}, {a: 1}, {b: 2}).b"), 2.0);
        assert_eq!(eval_number("Object.fromEntries([['x', 5]]).x"), 5.0);
    }

    #[test]
    fn test_object_create_and_has_own() {
        assert_eq!(
            eval_string("const p = {greet: 'hi'}; const o = Object.create(p); [o.greet, o.hasOwnProperty('greet')].join()"),
            "hi,false"
        );
        assert_eq!(eval_string("Object.hasOwn({a: 1}, 'a')"), "true");
    }

    #[test]
    fn test_keys_of_null_throws() {
        assert!(eval("Object.keys(null)").is_err());
    }

    #[test]
    fn test_call_apply_bind() {
        assert_eq!(eval_number("function f(a, b) { return this.base + a + b } f.call({base: 1}, 2, 3)"), 6.0);
        assert_eq!(eval_number("function f(a, b) { return this.base + a + b } f.apply({base: 1}, [2, 3])"), 6.0);
        assert_eq!(
            eval_number("function f(a, b) { return this.base + a + b } const g = f.bind({base: 10}, 1); g(2)"),
            13.0
        );
    }

    #[test]
    fn test_function_constructor_is_disabled() {
        assert!(eval("Function('return 1')").is_err());
    }
}
