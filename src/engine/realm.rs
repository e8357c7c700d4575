//! The ambient realm: built-in globals and prototypes

use std::cell::RefCell;
use std::collections::HashMap;

use crate::engine::builtins;
use crate::engine::environment::GlobalScope;
use crate::engine::value::{Object, ObjectKind, ObjectRef, Value};

/// Names of the error constructors the realm provides
pub const ERROR_NAMES: [&str; 6] = [
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "EvalError",
];

/// Prototype objects shared by all values of a kind
pub struct Prototypes {
    pub object: ObjectRef,
    pub function: ObjectRef,
    pub array: ObjectRef,
    pub string: ObjectRef,
    pub number: ObjectRef,
    pub boolean: ObjectRef,
    pub bytes: ObjectRef,
    pub date: ObjectRef,
    pub errors: HashMap<&'static str, ObjectRef>,
}

impl Prototypes {
    fn new() -> Self {
        let object = Object::new(None).into_ref();
        let derived = || Object::new(Some(object.clone())).into_ref();

        let base_error = derived();
        let mut errors = HashMap::new();
        for name in ERROR_NAMES {
            let proto = if name == "Error" {
                base_error.clone()
            } else {
                Object::new(Some(base_error.clone())).into_ref()
            };
            proto
                .borrow_mut()
                .properties
                .insert("name", Value::from(name));
            errors.insert(name, proto);
        }

        Self {
            function: derived(),
            array: derived(),
            string: derived(),
            number: derived(),
            boolean: derived(),
            bytes: derived(),
            date: derived(),
            errors,
            object,
        }
    }
}

/// The unrestricted global environment of the engine.
///
/// Holds every built-in the engine implements plus host-only names such as
/// `console` and the self reference `globalThis`. Scripts normally never see
/// it directly; an isolation view decides which of its names are visible.
pub struct Realm {
    globals: RefCell<HashMap<String, Value>>,
    prototypes: Prototypes,
}

impl Realm {
    pub fn new() -> Self {
        let realm = Self {
            globals: RefCell::new(HashMap::new()),
            prototypes: Prototypes::new(),
        };
        builtins::install(&realm);
        realm
    }

    pub fn define_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    /// Sorted names of all ambient globals, including `globalThis`
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.borrow().keys().cloned().collect();
        names.push("globalThis".to_string());
        names.sort();
        names
    }

    pub fn prototypes(&self) -> &Prototypes {
        &self.prototypes
    }

    pub fn object_prototype(&self) -> &ObjectRef {
        &self.prototypes.object
    }

    pub fn new_object(&self) -> ObjectRef {
        Object::new(Some(self.prototypes.object.clone())).into_ref()
    }

    pub fn new_date(&self, time: f64) -> Value {
        let date = Object::with_kind(Some(self.prototypes.date.clone()), ObjectKind::Date(time));
        Value::Object(date.into_ref())
    }

    /// Error object with the given name; names other than the built-in
    /// constructors inherit from `Error.prototype`
    pub fn make_error(&self, name: &str, message: &str) -> Value {
        let prototype = self
            .prototypes
            .errors
            .get(name)
            .or_else(|| self.prototypes.errors.get("Error"))
            .cloned();
        let mut error = Object::with_kind(prototype, ObjectKind::Error);
        error.properties.insert("name", Value::from(name));
        error.properties.insert("message", Value::from(message));
        Value::Object(error.into_ref())
    }

    /// Prototype a value's property lookups start from
    pub fn prototype_of(&self, value: &Value) -> Option<ObjectRef> {
        match value {
            Value::Object(object) => object.borrow().prototype.clone(),
            Value::Array(_) => Some(self.prototypes.array.clone()),
            Value::Bytes(_) => Some(self.prototypes.bytes.clone()),
            Value::Function(_) | Value::Native(_) => Some(self.prototypes.function.clone()),
            _ => None,
        }
    }

    /// Snapshot object of every ambient global, the value of `globalThis`
    fn global_object(&self) -> Value {
        let object = self.new_object();
        {
            let globals = self.globals.borrow();
            let mut names: Vec<&String> = globals.keys().collect();
            names.sort();
            let mut object = object.borrow_mut();
            for name in names {
                object.properties.insert(name.clone(), globals[name].clone());
            }
        }
        Value::Object(object)
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalScope for Realm {
    fn resolve(&self, name: &str) -> Option<Value> {
        if name == "globalThis" {
            return Some(self.global_object());
        }
        self.globals.borrow().get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        name == "globalThis" || self.globals.borrow().contains_key(name)
    }

    fn write(&self, name: &str, value: Value) {
        self.define_global(name, value);
    }
}
