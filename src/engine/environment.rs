//! Lexical scopes and the global scope seam

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::value::Value;

/// Outermost lookup scope of a running script.
///
/// Free identifiers that no lexical scope declares are read through
/// [`has`](GlobalScope::has) and [`resolve`](GlobalScope::resolve), and
/// assignments to them go to [`write`](GlobalScope::write). A `None` from
/// `resolve` reads as `undefined` in the script.
pub trait GlobalScope {
    fn resolve(&self, name: &str) -> Option<Value>;
    fn has(&self, name: &str) -> bool;
    fn write(&self, name: &str, value: Value);
}

struct Binding {
    value: Value,
    mutable: bool,
}

/// Outcome of assigning to a name through the scope chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Done,
    Constant,
    /// No lexical scope declares the name
    Unbound,
}

/// One lexical scope; function scopes additionally own `var` bindings
pub struct Scope {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
    is_function: bool,
    /// `this` of a non-arrow function scope
    this_value: Option<Value>,
}

impl Scope {
    pub fn function(parent: Option<Rc<Scope>>, this_value: Option<Value>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent,
            is_function: true,
            this_value,
        })
    }

    pub fn block(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            is_function: false,
            this_value: None,
        })
    }

    /// Sibling scope holding copies of this scope's bindings, used for
    /// per-iteration loop variables
    pub fn fork(&self) -> Rc<Self> {
        let bindings = self
            .bindings
            .borrow()
            .iter()
            .map(|(k, b)| {
                (
                    k.clone(),
                    Binding {
                        value: b.value.clone(),
                        mutable: b.mutable,
                    },
                )
            })
            .collect();
        Rc::new(Self {
            bindings: RefCell::new(bindings),
            parent: self.parent.clone(),
            is_function: self.is_function,
            this_value: self.this_value.clone(),
        })
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.bindings
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn declares(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.bindings.borrow().get(name) {
                return Some(binding.value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    pub fn assign(&self, name: &str, value: Value) -> Assignment {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.bindings.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Assignment::Constant;
                }
                binding.value = value;
                return Assignment::Done;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => return Assignment::Unbound,
            }
        }
    }

    /// Nearest enclosing function scope, where `var` declarations live
    pub fn function_scope(self: &Rc<Self>) -> Rc<Scope> {
        let mut scope = self.clone();
        while !scope.is_function {
            match scope.parent.clone() {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    /// `this` of the nearest non-arrow function scope
    pub fn this_value(&self) -> Value {
        let mut scope = self;
        loop {
            if let Some(this) = &scope.this_value {
                return this.clone();
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => return Value::Undefined,
            }
        }
    }

    /// Names declared directly in this scope
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let outer = Scope::function(None, None);
        outer.declare("a", Value::Number(1.0), true);
        let inner = Scope::block(&outer);
        inner.declare("b", Value::Number(2.0), true);

        assert_eq!(inner.lookup("a").map(|v| v.to_number()), Some(1.0));
        assert_eq!(inner.lookup("b").map(|v| v.to_number()), Some(2.0));
        assert!(outer.lookup("b").is_none());
    }

    #[test]
    fn test_assign_respects_const() {
        let scope = Scope::function(None, None);
        scope.declare("k", Value::Number(1.0), false);
        assert_eq!(scope.assign("k", Value::Number(2.0)), Assignment::Constant);
        assert_eq!(scope.assign("missing", Value::Null), Assignment::Unbound);
    }

    #[test]
    fn test_shadowing() {
        let outer = Scope::function(None, None);
        outer.declare("x", Value::from("outer"), true);
        let inner = Scope::block(&outer);
        inner.declare("x", Value::from("inner"), true);
        inner.assign("x", Value::from("changed"));

        assert_eq!(outer.lookup("x").unwrap().to_display_string(), "outer");
        assert_eq!(inner.lookup("x").unwrap().to_display_string(), "changed");
    }

    #[test]
    fn test_fork_copies_bindings() {
        let parent = Scope::function(None, None);
        let scope = Scope::block(&parent);
        scope.declare("i", Value::Number(0.0), true);
        let next = scope.fork();
        next.assign("i", Value::Number(1.0));

        assert_eq!(scope.lookup("i").unwrap().to_number(), 0.0);
        assert_eq!(next.lookup("i").unwrap().to_number(), 1.0);
    }

    #[test]
    fn test_var_goes_to_function_scope() {
        let func = Scope::function(None, Some(Value::Null));
        let block = Scope::block(&func);
        let nested = Scope::block(&block);
        assert!(Rc::ptr_eq(&nested.function_scope(), &func));
        assert!(matches!(nested.this_value(), Value::Null));
    }
}
