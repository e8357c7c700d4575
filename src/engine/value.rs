//! Runtime values of the script engine

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::engine::environment::Scope;
use crate::engine::executor::Interpreter;
use crate::parser::FunctionDef;

pub type ObjectRef = Rc<RefCell<Object>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type BytesRef = Rc<RefCell<Vec<u8>>>;

/// Signature of host-implemented functions: interpreter, `this`, arguments
pub type NativeFn = dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Exception>;

/// A script value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    /// `Uint8Array`
    Bytes(BytesRef),
}

// ============================================================================
// Objects and functions
// ============================================================================

/// Insertion-ordered property storage
#[derive(Clone, Default)]
pub struct PropertyMap {
    keys: Vec<String>,
    values: HashMap<String, Value>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.keys.retain(|k| k != key);
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.keys
            .iter()
            .filter_map(move |k| self.values.get(k).map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// What an object represents beyond its properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectKind {
    Ordinary,
    /// Milliseconds since the Unix epoch, NaN for an invalid date
    Date(f64),
    Error,
    /// An error raised by the host-call machinery; scripts can catch and
    /// rethrow one but never create one
    HostError(HostFault),
}

impl ObjectKind {
    pub fn is_error(&self) -> bool {
        matches!(self, ObjectKind::Error | ObjectKind::HostError(_))
    }
}

/// Category of a host-raised error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFault {
    HandlerNotFound,
    Encoding,
    Bridge,
}

pub struct Object {
    pub properties: PropertyMap,
    pub prototype: Option<ObjectRef>,
    pub kind: ObjectKind,
}

impl Object {
    pub fn new(prototype: Option<ObjectRef>) -> Self {
        Self {
            properties: PropertyMap::new(),
            prototype,
            kind: ObjectKind::Ordinary,
        }
    }

    pub fn with_kind(prototype: Option<ObjectRef>, kind: ObjectKind) -> Self {
        Self {
            kind,
            ..Self::new(prototype)
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    /// Property lookup along the prototype chain
    pub fn lookup(object: &ObjectRef, key: &str) -> Option<Value> {
        let mut current = Some(object.clone());
        while let Some(obj) = current {
            let obj = obj.borrow();
            if let Some(value) = obj.properties.get(key) {
                return Some(value.clone());
            }
            current = obj.prototype.clone();
        }
        None
    }

    pub fn has_property(object: &ObjectRef, key: &str) -> bool {
        Self::lookup(object, key).is_some()
    }
}

/// A function defined by script code together with its captured scope
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Rc<Scope>,
    pub properties: RefCell<PropertyMap>,
}

impl Closure {
    pub fn new(def: Rc<FunctionDef>, scope: Rc<Scope>) -> Self {
        Self {
            def,
            scope,
            properties: RefCell::new(PropertyMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or("")
    }
}

/// A function implemented in Rust
pub struct NativeFunction {
    pub name: String,
    pub func: Box<NativeFn>,
    /// Behaviour under `new`; functions without one are not constructors
    pub constructor: Option<Box<NativeFn>>,
    pub properties: RefCell<PropertyMap>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Exception> + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
            constructor: None,
            properties: RefCell::new(PropertyMap::new()),
        }
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Exception> + 'static,
    {
        self.constructor = Some(Box::new(constructor));
        self
    }

    pub fn with_property(self, key: &str, value: Value) -> Self {
        self.properties.borrow_mut().insert(key, value);
        self
    }

    pub fn into_value(self) -> Value {
        Value::Native(Rc::new(self))
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(RefCell::new(data)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Bytes(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Human readable type name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Bytes(_) => "Uint8Array",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(obj) => match obj.borrow().kind {
                ObjectKind::Date(t) => t,
                _ => f64::NAN,
            },
            Value::Array(_) | Value::Bytes(_) => string_to_number(&self.to_display_string()),
            Value::Function(_) | Value::Native(_) => f64::NAN,
        }
    }

    /// Integer conversion used by indices and counts; NaN becomes 0
    pub fn to_integer(&self) -> f64 {
        let n = self.to_number();
        if n.is_nan() {
            0.0
        } else {
            n.trunc()
        }
    }

    pub fn to_int32(&self) -> i32 {
        self.to_uint32() as i32
    }

    pub fn to_uint32(&self) -> u32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        n.trunc().rem_euclid(4294967296.0) as u32
    }

    /// String conversion as performed by concatenation and `String(x)`
    pub fn to_display_string(&self) -> String {
        let mut seen = Vec::new();
        self.display_inner(&mut seen)
    }

    fn display_inner(&self, seen: &mut Vec<*const ()>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) {
                    return String::new();
                }
                seen.push(ptr);
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            v.display_inner(seen)
                        }
                    })
                    .collect();
                seen.pop();
                parts.join(",")
            }
            Value::Bytes(data) => data
                .borrow()
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(obj) => {
                let kind = obj.borrow().kind;
                match kind {
                    ObjectKind::Date(t) => crate::engine::builtins::date::format_date(t),
                    ObjectKind::Error | ObjectKind::HostError(_) => {
                        let name = Object::lookup(obj, "name")
                            .map(|v| v.to_display_string())
                            .unwrap_or_else(|| "Error".to_string());
                        let message = Object::lookup(obj, "message")
                            .map(|v| v.to_display_string())
                            .unwrap_or_default();
                        if message.is_empty() {
                            name
                        } else {
                            format!("{}: {}", name, message)
                        }
                    }
                    ObjectKind::Ordinary => "[object Object]".to_string(),
                }
            }
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name()),
            Value::Native(f) => format!("function {}() {{ [native code] }}", f.name),
        }
    }

    /// Identity of reference values, for cycle detection
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as *const ()),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const ()),
            Value::Bytes(b) => Some(Rc::as_ptr(b) as *const ()),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const ()),
            Value::Native(f) => Some(Rc::as_ptr(f) as *const ()),
            _ => None,
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Equality used by `includes`: like `===` except NaN equals NaN
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (a, b) if a.identity().is_some() && b.identity().is_none() => {
                Value::from(a.to_display_string()).loose_equals(b)
            }
            (a, b) if a.identity().is_none() && b.identity().is_some() => {
                a.loose_equals(&Value::from(b.to_display_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Value::Object(obj) => {
                let obj = obj.borrow();
                let keys: Vec<&String> = obj.properties.keys().collect();
                write!(f, "Object({:?}, {:?})", obj.kind, keys)
            }
            Value::Bytes(data) => write!(f, "Uint8Array({:?})", data.borrow()),
            other => write!(f, "{}", other.to_display_string()),
        }
    }
}

/// Number to string conversion matching script semantics
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        // Rust renders `1e21`; scripts expect `1e+21`
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    if n.fract() == 0.0 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0b") | Some("0B") => Some(2),
        Some("0o") | Some("0O") => Some(8),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)) => {
            t.parse::<f64>().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

// ============================================================================
// Exceptions
// ============================================================================

/// A thrown script value propagating through the interpreter
#[derive(Clone)]
pub struct Exception {
    pub value: Value,
}

impl Exception {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Error name and message when the thrown value is an error object;
    /// otherwise no name and the string form of the value
    pub fn name_and_message(&self) -> (Option<String>, String) {
        if let Value::Object(obj) = &self.value {
            if obj.borrow().kind.is_error() {
                let name = Object::lookup(obj, "name")
                    .map(|v| v.to_display_string())
                    .unwrap_or_else(|| "Error".to_string());
                let message = Object::lookup(obj, "message")
                    .map(|v| v.to_display_string())
                    .unwrap_or_default();
                return (Some(name), message);
            }
        }
        (None, self.value.to_display_string())
    }

    /// Category of an error thrown by the host-call machinery
    pub fn host_fault(&self) -> Option<HostFault> {
        match &self.value {
            Value::Object(obj) => match obj.borrow().kind {
                ObjectKind::HostError(fault) => Some(fault),
                _ => None,
            },
            _ => None,
        }
    }

    /// Handler name attached to bridge errors
    pub fn handler(&self) -> Option<String> {
        match &self.value {
            Value::Object(obj) => obj
                .borrow()
                .properties
                .get("handler")
                .map(|v| v.to_display_string()),
            _ => None,
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exception({})", self)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name_and_message() {
            (Some(name), message) => write!(f, "{}: {}", name, message),
            (None, message) => write!(f, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from("  42 ").to_number(), 42.0);
        assert_eq!(Value::from("0x10").to_number(), 16.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::array(vec![Value::Number(7.0)]).to_number(), 7.0);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));

        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn test_array_display() {
        let v = Value::array(vec![
            Value::Number(1.0),
            Value::Null,
            Value::from("x"),
        ]);
        assert_eq!(v.to_display_string(), "1,,x");
    }

    #[test]
    fn test_int32_wraps() {
        assert_eq!(Value::Number(4294967297.0).to_int32(), 1);
        assert_eq!(Value::Number(-1.0).to_uint32(), 4294967295);
    }

    #[test]
    fn test_property_map_keeps_insertion_order() {
        let mut map = PropertyMap::new();
        map.insert("b", Value::Number(1.0));
        map.insert("a", Value::Number(2.0));
        map.insert("b", Value::Number(3.0));
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        map.remove("b");
        assert_eq!(map.len(), 1);
    }
}
