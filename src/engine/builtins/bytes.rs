//! `Uint8Array`, the engine's byte buffer type

use super::{arg, define_method, relative_index, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{BytesRef, Exception, NativeFunction, Value};

const MAX_BYTES: f64 = (1u32 << 26) as f64;

pub fn install(realm: &Realm) {
    let constructor = NativeFunction::new("Uint8Array", |interp, _, _| {
        Err(interp.type_error("Constructor Uint8Array requires 'new'"))
    })
    .with_constructor(|interp, _, args| from_source(interp, &arg(&args, 0)));
    let constructor = with_prototype(constructor, &realm.prototypes().bytes).with_property(
        "from",
        NativeFunction::new("from", |interp, _, args| from_source(interp, &arg(&args, 0))).into_value(),
    );
    realm.define_global("Uint8Array", constructor.into_value());

    let proto = &realm.prototypes().bytes;
    define_method(proto, "slice", |interp, this, args| {
        let data = this_bytes(interp, &this)?;
        let data = data.borrow();
        let start = relative_index(&arg(&args, 0), data.len(), 0);
        let end = relative_index(&arg(&args, 1), data.len(), data.len());
        Ok(Value::bytes(data.get(start..end.max(start)).map(<[u8]>::to_vec).unwrap_or_default()))
    });
    define_method(proto, "join", |interp, this, args| {
        let data = this_bytes(interp, &this)?;
        let separator = match arg(&args, 0) {
            Value::Undefined => ",".to_string(),
            other => other.to_display_string(),
        };
        let joined = data
            .borrow()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(&separator);
        Ok(Value::from(joined))
    });
    define_method(proto, "toString", |interp, this, _| {
        this_bytes(interp, &this)?;
        Ok(Value::from(this.to_display_string()))
    });
    define_method(proto, "indexOf", |interp, this, args| {
        let data = this_bytes(interp, &this)?;
        let needle = arg(&args, 0).to_number();
        let found = data.borrow().iter().position(|b| *b as f64 == needle);
        Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
    });
    define_method(proto, "includes", |interp, this, args| {
        let data = this_bytes(interp, &this)?;
        let needle = arg(&args, 0).to_number();
        let found = data.borrow().iter().any(|b| *b as f64 == needle);
        Ok(Value::Bool(found))
    });
    define_method(proto, "fill", |interp, this, args| {
        let data = this_bytes(interp, &this)?;
        let byte = arg(&args, 0).to_uint32() as u8;
        data.borrow_mut().iter_mut().for_each(|b| *b = byte);
        Ok(this)
    });
}

fn this_bytes(interp: &Interpreter, this: &Value) -> Result<BytesRef, Exception> {
    match this {
        Value::Bytes(data) => Ok(data.clone()),
        other => Err(interp.type_error(format!("{} is not a Uint8Array", other.kind_name()))),
    }
}

/// Length, array-like or iterable source; elements wrap modulo 256
fn from_source(interp: &mut Interpreter, source: &Value) -> Result<Value, Exception> {
    match source {
        Value::Undefined => Ok(Value::bytes(Vec::new())),
        Value::Number(n) => {
            if *n < 0.0 || n.fract() != 0.0 || *n > MAX_BYTES {
                return Err(interp.range_error("Invalid typed array length"));
            }
            Ok(Value::bytes(vec![0; *n as usize]))
        }
        Value::Bytes(data) => Ok(Value::bytes(data.borrow().clone())),
        other => {
            let items = interp.iterate(other)?;
            Ok(Value::bytes(items.iter().map(|v| v.to_uint32() as u8).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_construction() {
        assert_eq!(eval_number("new Uint8Array(4).length"), 4.0);
        assert_eq!(eval_string("new Uint8Array([1, 256, -1]).join()"), "1,0,255");
        assert_eq!(eval_string("Uint8Array.from('12').join('-')"), "1-2");
        assert!(eval("Uint8Array(2)").is_err());
        assert!(eval("new Uint8Array(-1)").is_err());
    }

    #[test]
    fn test_index_access_wraps() {
        assert_eq!(eval_number("const b = new Uint8Array(2); b[0] = 300; b[0]"), 44.0);
        assert_eq!(eval_string("typeof new Uint8Array(1)[5]"), "undefined");
    }

    #[test]
    fn test_methods() {
        assert_eq!(eval_string("new Uint8Array([1, 2, 3]).slice(1).toString()"), "2,3");
        assert_eq!(eval_number("new Uint8Array([5, 6]).indexOf(6)"), 1.0);
        assert_eq!(eval_string("new Uint8Array(3).fill(7).join()"), "7,7,7");
        assert_eq!(eval_string("new Uint8Array([1]) instanceof Uint8Array"), "true");
    }
}
