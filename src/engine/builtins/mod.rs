//! Built-in globals and prototype methods of the ambient realm

pub mod array;
pub mod bytes;
pub mod date;
pub mod error;
pub mod globals;
pub mod json;
pub mod math;
pub mod number;
pub mod object;
pub mod string;

use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{Exception, NativeFunction, ObjectRef, Value};

/// Populate a fresh realm
pub fn install(realm: &Realm) {
    globals::install(realm);
    object::install(realm);
    error::install(realm);
    array::install(realm);
    string::install(realm);
    number::install(realm);
    math::install(realm);
    date::install(realm);
    json::install(realm);
    bytes::install(realm);
}

/// Argument at `index`, `undefined` when absent
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Install a native method on a prototype or namespace object
pub(crate) fn define_method<F>(target: &ObjectRef, name: &str, func: F)
where
    F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Exception> + 'static,
{
    let native = NativeFunction::new(name, func).into_value();
    target.borrow_mut().properties.insert(name, native);
}

pub(crate) fn define_value(target: &ObjectRef, name: &str, value: Value) {
    target.borrow_mut().properties.insert(name, value);
}

/// Attach the shared prototype object so that `instanceof` works
pub(crate) fn with_prototype(native: NativeFunction, prototype: &ObjectRef) -> NativeFunction {
    native.with_property("prototype", Value::Object(prototype.clone()))
}

/// Resolve a relative index argument (negative counts from the end)
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_integer();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}
