//! Tree-walking interpreter

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::debug;

use crate::engine::builtins;
use crate::engine::environment::{Assignment, GlobalScope, Scope};
use crate::engine::realm::Realm;
use crate::engine::value::{Closure, Exception, Object, ObjectKind, Value};
use crate::parser::ast::*;

/// Engine hygiene limits applied to one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Maximum nesting of function calls before a RangeError is thrown
    pub max_call_depth: usize,
}

/// Remaining native stack below which evaluation moves to a fresh segment
const RED_ZONE: usize = 128 * 1024;
/// Size of each extra stack segment
const STACK_CHUNK: usize = 2 * 1024 * 1024;

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self { max_call_depth: 256 }
    }
}

/// How control leaves a statement
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Place an assignment or update writes to
enum Reference {
    Name(String),
    Property(Value, String),
}

/// Executes parsed scripts against a realm and a global scope
pub struct Interpreter {
    realm: Rc<Realm>,
    global: Rc<dyn GlobalScope>,
    limits: ExecutionLimits,
    depth: usize,
    completion: Value,
}

impl Interpreter {
    pub fn new(realm: Rc<Realm>, global: Rc<dyn GlobalScope>, limits: ExecutionLimits) -> Self {
        Self {
            realm,
            global,
            limits,
            depth: 0,
            completion: Value::Undefined,
        }
    }

    pub fn realm(&self) -> &Rc<Realm> {
        &self.realm
    }

    /// Run a script body in a fresh function scope.
    ///
    /// Returns the value of a top-level `return`, otherwise the value of the
    /// last evaluated expression statement.
    pub fn run(&mut self, script: &Script) -> Result<Value, Exception> {
        let scope = Scope::function(None, Some(Value::Undefined));
        self.completion = Value::Undefined;
        self.hoist_vars(&script.statements, &scope);

        match self.exec_statements(&script.statements, &scope)? {
            Flow::Return(value) => Ok(value),
            Flow::Break | Flow::Continue => {
                Err(self.error("SyntaxError", "Illegal break or continue statement"))
            }
            Flow::Normal => Ok(std::mem::take(&mut self.completion)),
        }
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Build a thrown error object of the given constructor name
    pub fn error(&self, name: &str, message: impl Into<String>) -> Exception {
        Exception::new(self.realm.make_error(name, &message.into()))
    }

    pub fn type_error(&self, message: impl Into<String>) -> Exception {
        self.error("TypeError", message)
    }

    pub fn range_error(&self, message: impl Into<String>) -> Exception {
        self.error("RangeError", message)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_statements(&mut self, statements: &[Statement], scope: &Rc<Scope>) -> Result<Flow, Exception> {
        self.hoist_functions(statements, scope);
        for statement in statements {
            match self.exec(statement, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, statement: &Statement, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || self.exec_statement(statement, scope))
    }

    fn exec_statement(&mut self, statement: &Statement, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        match statement {
            Statement::Expression(expr) => {
                let value = self.eval(expr, scope)?;
                if self.depth == 0 {
                    self.completion = value;
                }
                Ok(Flow::Normal)
            }
            Statement::Declaration(decl) => {
                self.declare(decl, scope)?;
                Ok(Flow::Normal)
            }
            // Hoisted when the enclosing statement list is entered
            Statement::Function(_) => Ok(Flow::Normal),
            Statement::If(stmt) => {
                if self.eval(&stmt.test, scope)?.truthy() {
                    self.exec(&stmt.consequent, scope)
                } else if let Some(alternate) = &stmt.alternate {
                    self.exec(alternate, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    if let Some(flow) = self.loop_body(body, scope)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::DoWhile { body, test } => {
                loop {
                    if let Some(flow) = self.loop_body(body, scope)? {
                        return Ok(flow);
                    }
                    if !self.eval(test, scope)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                }
            }
            Statement::For(for_loop) => self.exec_for(for_loop, scope),
            Statement::ForOf(each) => self.exec_for_each(each, scope, true),
            Statement::ForIn(each) => self.exec_for_each(each, scope, false),
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
            Statement::Throw(expr) => Err(Exception::new(self.eval(expr, scope)?)),
            Statement::Try(stmt) => self.exec_try(stmt, scope),
            Statement::Block(statements) => {
                let block = Scope::block(scope);
                self.exec_statements(statements, &block)
            }
            Statement::Empty => Ok(Flow::Normal),
        }
    }

    /// Run one loop iteration; `Some` means the loop exits with that flow
    fn loop_body(&mut self, body: &Statement, scope: &Rc<Scope>) -> Result<Option<Flow>, Exception> {
        match self.exec(body, scope)? {
            Flow::Break => Ok(Some(Flow::Normal)),
            Flow::Return(value) => Ok(Some(Flow::Return(value))),
            Flow::Continue | Flow::Normal => Ok(None),
        }
    }

    fn declare(&mut self, decl: &VarDeclaration, scope: &Rc<Scope>) -> Result<(), Exception> {
        for binding in &decl.bindings {
            let value = match &binding.init {
                Some(init) => Some(self.eval(init, scope)?),
                None => None,
            };
            match decl.kind {
                VarKind::Var => {
                    if let Some(value) = value {
                        scope.function_scope().declare(&binding.name, value, true);
                    }
                }
                kind => scope.declare(&binding.name, value.unwrap_or_default(), kind == VarKind::Let),
            }
        }
        Ok(())
    }

    fn exec_for(&mut self, for_loop: &ForLoop, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        let mut iteration = Scope::block(scope);
        let mut per_iteration = false;
        match &for_loop.init {
            Some(ForInit::Declaration(decl)) => {
                per_iteration = decl.kind != VarKind::Var;
                self.declare(decl, &iteration)?;
            }
            Some(ForInit::Expression(expr)) => {
                self.eval(expr, &iteration)?;
            }
            None => {}
        }

        loop {
            if let Some(test) = &for_loop.test {
                if !self.eval(test, &iteration)?.truthy() {
                    break;
                }
            }
            if let Some(flow) = self.loop_body(&for_loop.body, &iteration)? {
                return Ok(flow);
            }
            if per_iteration {
                iteration = iteration.fork();
            }
            if let Some(update) = &for_loop.update {
                self.eval(update, &iteration)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for_each(&mut self, each: &ForEachLoop, scope: &Rc<Scope>, of: bool) -> Result<Flow, Exception> {
        let source = self.eval(&each.source, scope)?;
        let items = if of {
            self.iterate(&source)?
        } else {
            self.own_keys(&source).into_iter().map(Value::from).collect()
        };

        for item in items {
            let iteration = Scope::block(scope);
            match each.kind {
                Some(VarKind::Var) | None => self.assign_name(&each.name, item, scope)?,
                Some(kind) => iteration.declare(&each.name, item, kind == VarKind::Let),
            }
            if let Some(flow) = self.loop_body(&each.body, &iteration)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(&mut self, stmt: &TryStatement, scope: &Rc<Scope>) -> Result<Flow, Exception> {
        let block = Scope::block(scope);
        let mut result = self.exec_statements(&stmt.block, &block);

        if let Some(handler) = &stmt.handler {
            result = match result {
                Err(exception) => {
                    let catch_scope = Scope::block(scope);
                    if let Some(param) = &handler.param {
                        catch_scope.declare(param, exception.value, true);
                    }
                    self.exec_statements(&handler.body, &catch_scope)
                }
                ok => ok,
            };
        }

        if let Some(finalizer) = &stmt.finalizer {
            let finally_scope = Scope::block(scope);
            match self.exec_statements(finalizer, &finally_scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }

        result
    }

    // ========================================================================
    // Hoisting
    // ========================================================================

    fn hoist_functions(&mut self, statements: &[Statement], scope: &Rc<Scope>) {
        for statement in statements {
            if let Statement::Function(def) = statement {
                if let Some(name) = &def.name {
                    let closure = Closure::new(def.clone(), scope.clone());
                    scope.declare(name, Value::Function(Rc::new(closure)), true);
                }
            }
        }
    }

    /// Declare every `var` of a function body as undefined, without
    /// descending into nested functions
    fn hoist_vars(&self, statements: &[Statement], scope: &Rc<Scope>) {
        for statement in statements {
            self.hoist_vars_in(statement, scope);
        }
    }

    fn hoist_vars_in(&self, statement: &Statement, scope: &Rc<Scope>) {
        let declare = |name: &str| {
            if !scope.declares(name) {
                scope.declare(name, Value::Undefined, true);
            }
        };
        match statement {
            Statement::Declaration(decl) if decl.kind == VarKind::Var => {
                decl.bindings.iter().for_each(|b| declare(&b.name));
            }
            Statement::If(stmt) => {
                self.hoist_vars_in(&stmt.consequent, scope);
                if let Some(alternate) = &stmt.alternate {
                    self.hoist_vars_in(alternate, scope);
                }
            }
            Statement::While { body, .. } | Statement::DoWhile { body, .. } => {
                self.hoist_vars_in(body, scope)
            }
            Statement::For(for_loop) => {
                if let Some(ForInit::Declaration(decl)) = &for_loop.init {
                    if decl.kind == VarKind::Var {
                        decl.bindings.iter().for_each(|b| declare(&b.name));
                    }
                }
                self.hoist_vars_in(&for_loop.body, scope);
            }
            Statement::ForOf(each) | Statement::ForIn(each) => {
                if each.kind == Some(VarKind::Var) {
                    declare(&each.name);
                }
                self.hoist_vars_in(&each.body, scope);
            }
            Statement::Try(stmt) => {
                self.hoist_vars(&stmt.block, scope);
                if let Some(handler) = &stmt.handler {
                    self.hoist_vars(&handler.body, scope);
                }
                if let Some(finalizer) = &stmt.finalizer {
                    self.hoist_vars(finalizer, scope);
                }
            }
            Statement::Block(statements) => self.hoist_vars(statements, scope),
            _ => {}
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, Exception> {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || self.eval_expr(expr, scope))
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, Exception> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::from(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Substitution(expr) => {
                            out.push_str(&self.eval(expr, scope)?.to_display_string())
                        }
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Identifier(name) => Ok(self.lookup(name, scope)),
            Expr::This => Ok(scope.this_value()),
            Expr::Array(items) => Ok(Value::array(self.eval_arguments(items, scope)?)),
            Expr::Object(members) => self.eval_object(members, scope),
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure::new(
                def.clone(),
                scope.clone(),
            )))),
            Expr::Member { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or_default())
            }
            Expr::New { callee, arguments } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_arguments(arguments, scope)?;
                if !constructor.is_callable() {
                    return Err(self.type_error(format!("{} is not a constructor", describe(callee))));
                }
                self.construct(&constructor, args)
            }
            Expr::Unary { op, argument } => self.eval_unary(*op, argument, scope),
            Expr::Update { op, prefix, target } => {
                let reference = self.reference(target, scope)?;
                let old = self.read_reference(&reference, scope)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_reference(reference, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                if short_circuits(*op, &left) {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Free identifiers fall through lexical scopes to the global scope
    fn lookup(&self, name: &str, scope: &Rc<Scope>) -> Value {
        if let Some(value) = scope.lookup(name) {
            return value;
        }
        if self.global.has(name) {
            self.global.resolve(name).unwrap_or_default()
        } else {
            Value::Undefined
        }
    }

    fn assign_name(&mut self, name: &str, value: Value, scope: &Rc<Scope>) -> Result<(), Exception> {
        match scope.assign(name, value.clone()) {
            Assignment::Done => Ok(()),
            Assignment::Constant => {
                Err(self.type_error(format!("Assignment to constant variable '{}'", name)))
            }
            Assignment::Unbound => {
                self.global.write(name, value);
                Ok(())
            }
        }
    }

    fn eval_object(&mut self, members: &[ObjectMember], scope: &Rc<Scope>) -> Result<Value, Exception> {
        let object = self.realm.new_object();
        for member in members {
            match member {
                ObjectMember::Property { key, value } => {
                    let key = match key {
                        PropertyKey::Static(name) => name.clone(),
                        PropertyKey::Computed(expr) => property_key(&self.eval(expr, scope)?),
                    };
                    let value = self.eval(value, scope)?;
                    object.borrow_mut().properties.insert(key, value);
                }
                ObjectMember::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    for (key, value) in self.own_entries(&source) {
                        object.borrow_mut().properties.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::Object(object))
    }

    fn eval_arguments(&mut self, arguments: &[Argument], scope: &Rc<Scope>) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let value = self.eval(&argument.value, scope)?;
            if argument.spread {
                values.extend(self.iterate(&value)?);
            } else {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn member_key(&mut self, property: &MemberProperty, scope: &Rc<Scope>) -> Result<String, Exception> {
        match property {
            MemberProperty::Named(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(property_key(&self.eval(expr, scope)?)),
        }
    }

    /// Evaluate a member/call chain; `None` when an optional link
    /// short-circuited the rest of the chain
    fn eval_chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Option<Value>, Exception> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                self.get_property(&target, &key).map(Some)
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => {
                let Some((this, func)) = self.eval_callee(callee, scope)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                if !func.is_callable() {
                    return Err(self.type_error(format!("{} is not a function", describe(callee))));
                }
                let args = self.eval_arguments(arguments, scope)?;
                self.call_value(&func, this, args).map(Some)
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    /// Evaluate a callee, keeping the receiver of method calls as `this`
    fn eval_callee(&mut self, callee: &Expr, scope: &Rc<Scope>) -> Result<Option<(Value, Value)>, Exception> {
        match callee {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                let func = self.get_property(&target, &key)?;
                Ok(Some((target, func)))
            }
            other => Ok(self.eval_chain(other, scope)?.map(|f| (Value::Undefined, f))),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, argument: &Expr, scope: &Rc<Scope>) -> Result<Value, Exception> {
        if op == UnaryOp::Delete {
            return match argument {
                Expr::Member {
                    object, property, ..
                } => {
                    let target = self.eval(object, scope)?;
                    let key = self.member_key(property, scope)?;
                    self.delete_property(&target, &key).map(Value::Bool)
                }
                _ => Ok(Value::Bool(true)),
            };
        }

        let value = self.eval(argument, scope)?;
        Ok(match op {
            UnaryOp::Typeof => Value::from(value.type_of()),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Negate => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::BitNot => Value::Number(!value.to_int32() as f64),
            UnaryOp::Delete => Value::Bool(true),
        })
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, scope: &Rc<Scope>) -> Result<Value, Exception> {
        let reference = self.reference(target, scope)?;
        let result = match op {
            AssignOp::Assign => self.eval(value, scope)?,
            AssignOp::Compound(binary) => {
                let current = self.read_reference(&reference, scope)?;
                let rhs = self.eval(value, scope)?;
                self.binary(binary, &current, &rhs)?
            }
            AssignOp::Logical(logical) => {
                let current = self.read_reference(&reference, scope)?;
                if short_circuits(logical, &current) {
                    return Ok(current);
                }
                self.eval(value, scope)?
            }
        };
        self.write_reference(reference, result.clone(), scope)?;
        Ok(result)
    }

    fn reference(&mut self, target: &Expr, scope: &Rc<Scope>) -> Result<Reference, Exception> {
        match target {
            Expr::Identifier(name) => Ok(Reference::Name(name.clone())),
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                Ok(Reference::Property(object, key))
            }
            _ => Err(self.error("SyntaxError", "Invalid assignment target")),
        }
    }

    fn read_reference(&mut self, reference: &Reference, scope: &Rc<Scope>) -> Result<Value, Exception> {
        match reference {
            Reference::Name(name) => Ok(self.lookup(name, scope)),
            Reference::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_reference(&mut self, reference: Reference, value: Value, scope: &Rc<Scope>) -> Result<(), Exception> {
        match reference {
            Reference::Name(name) => self.assign_name(&name, value, scope),
            Reference::Property(object, key) => self.set_property(&object, &key, value),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
        let number = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => {
                let stringy = |v: &Value| matches!(v, Value::String(_)) || v.identity().is_some();
                if stringy(left) || stringy(right) {
                    let mut s = to_primitive(left).to_display_string();
                    s.push_str(&to_primitive(right).to_display_string());
                    Value::from(s)
                } else {
                    number(|a, b| a + b)
                }
            }
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Mod => number(|a, b| a % b),
            BinaryOp::Pow => number(builtins::math::pow),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt => Value::Bool(matches!(compare(left, right), Some(Ordering::Less))),
            BinaryOp::LtEq => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(matches!(compare(left, right), Some(Ordering::Greater))),
            BinaryOp::GtEq => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::BitAnd => Value::Number((left.to_int32() & right.to_int32()) as f64),
            BinaryOp::BitOr => Value::Number((left.to_int32() | right.to_int32()) as f64),
            BinaryOp::BitXor => Value::Number((left.to_int32() ^ right.to_int32()) as f64),
            BinaryOp::Shl => {
                Value::Number(left.to_int32().wrapping_shl(right.to_uint32() & 31) as f64)
            }
            BinaryOp::Shr => Value::Number((left.to_int32() >> (right.to_uint32() & 31)) as f64),
            BinaryOp::UShr => Value::Number((left.to_uint32() >> (right.to_uint32() & 31)) as f64),
            BinaryOp::In => Value::Bool(self.has_property(right, &property_key(left))?),
            BinaryOp::Instanceof => Value::Bool(self.instance_of(left, right)?),
        })
    }

    fn instance_of(&self, value: &Value, constructor: &Value) -> Result<bool, Exception> {
        if !constructor.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(prototype) = self.get_property(constructor, "prototype")? else {
            return Ok(false);
        };
        let mut current = self.realm.prototype_of(value);
        while let Some(object) = current {
            if Rc::ptr_eq(&object, &prototype) {
                return Ok(true);
            }
            current = object.borrow().prototype.clone();
        }
        Ok(false)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn enter_call(&mut self) -> Result<(), Exception> {
        if self.depth >= self.limits.max_call_depth {
            debug!(
                target: "scriptit::engine",
                depth = self.depth,
                "call depth limit reached"
            );
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Call any callable value
    pub fn call_value(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Result<Value, Exception> {
        self.enter_call()?;
        let result = stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || match func {
            Value::Native(native) => (native.func)(self, this, args),
            Value::Function(closure) => self.call_closure(closure, this, args),
            other => Err(self.type_error(format!("{} is not a function", other.kind_name()))),
        });
        self.depth -= 1;
        result
    }

    /// `new func(...args)`
    pub fn construct(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, Exception> {
        match func {
            Value::Native(native) => {
                let Some(constructor) = &native.constructor else {
                    return Err(self.type_error(format!("{} is not a constructor", native.name)));
                };
                self.enter_call()?;
                let result = constructor(self, Value::Undefined, args);
                self.depth -= 1;
                result
            }
            Value::Function(closure) if !closure.def.is_arrow => {
                let prototype = match self.get_property(func, "prototype")? {
                    Value::Object(proto) => proto,
                    _ => self.realm.object_prototype().clone(),
                };
                let instance = Value::Object(Object::new(Some(prototype)).into_ref());
                let result = self.call_value(func, instance.clone(), args)?;
                Ok(match result {
                    Value::Undefined
                    | Value::Null
                    | Value::Bool(_)
                    | Value::Number(_)
                    | Value::String(_) => instance,
                    other => other,
                })
            }
            other => Err(self.type_error(format!("{} is not a constructor", other.kind_name()))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Result<Value, Exception> {
        let def = &closure.def;
        let this_value = if def.is_arrow { None } else { Some(this) };
        let scope = Scope::function(Some(closure.scope.clone()), this_value);

        if !def.is_arrow {
            if let Some(name) = &def.name {
                scope.declare(name, Value::Function(closure.clone()), true);
            }
            scope.declare("arguments", Value::array(args.clone()), true);
        }

        for (i, param) in def.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(args.get(i..).map(<[Value]>::to_vec).unwrap_or_default())
            } else {
                args.get(i).cloned().unwrap_or_default()
            };
            let value = match (&param.default, value) {
                (Some(default), Value::Undefined) => self.eval(default, &scope)?,
                (_, value) => value,
            };
            scope.declare(&param.name, value, true);
        }

        match &def.body {
            FunctionBody::Expression(expr) => self.eval(expr, &scope),
            FunctionBody::Block(statements) => {
                self.hoist_vars(statements, &scope);
                match self.exec_statements(statements, &scope)? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub fn get_property(&self, target: &Value, key: &str) -> Result<Value, Exception> {
        let protos = self.realm.prototypes();
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                target.kind_name(),
                key
            ))),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or_default());
                }
                Ok(Object::lookup(&protos.string, key).unwrap_or_default())
            }
            Value::Number(_) => Ok(Object::lookup(&protos.number, key).unwrap_or_default()),
            Value::Bool(_) => Ok(Object::lookup(&protos.boolean, key).unwrap_or_default()),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(items.borrow().get(index).cloned().unwrap_or_default());
                }
                Ok(Object::lookup(&protos.array, key).unwrap_or_default())
            }
            Value::Bytes(data) => {
                if key == "length" || key == "byteLength" {
                    return Ok(Value::Number(data.borrow().len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(data
                        .borrow()
                        .get(index)
                        .map(|b| Value::Number(*b as f64))
                        .unwrap_or_default());
                }
                Ok(Object::lookup(&protos.bytes, key).unwrap_or_default())
            }
            Value::Object(object) => Ok(Object::lookup(object, key).unwrap_or_default()),
            Value::Function(closure) => {
                if let Some(value) = closure.properties.borrow().get(key) {
                    return Ok(value.clone());
                }
                match key {
                    "name" => Ok(Value::from(closure.name())),
                    "length" => Ok(Value::Number(
                        closure
                            .def
                            .params
                            .iter()
                            .filter(|p| !p.rest && p.default.is_none())
                            .count() as f64,
                    )),
                    "prototype" if !closure.def.is_arrow => {
                        let prototype = Value::Object(self.realm.new_object());
                        closure
                            .properties
                            .borrow_mut()
                            .insert("prototype", prototype.clone());
                        Ok(prototype)
                    }
                    _ => Ok(Object::lookup(&protos.function, key).unwrap_or_default()),
                }
            }
            Value::Native(native) => {
                if let Some(value) = native.properties.borrow().get(key) {
                    return Ok(value.clone());
                }
                match key {
                    "name" => Ok(Value::from(native.name.as_str())),
                    _ => Ok(Object::lookup(&protos.function, key).unwrap_or_default()),
                }
            }
        }
    }

    pub fn set_property(&self, target: &Value, key: &str, value: Value) -> Result<(), Exception> {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                target.kind_name(),
                key
            ))),
            Value::Object(object) => {
                object.borrow_mut().properties.insert(key, value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if let Some(index) = array_index(key) {
                    if index >= items.len() {
                        check_array_growth(self, index + 1)?;
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                } else if key == "length" {
                    let length = value.to_number();
                    if length < 0.0 || length.fract() != 0.0 || !length.is_finite() {
                        return Err(self.range_error("Invalid array length"));
                    }
                    check_array_growth(self, length as usize)?;
                    items.resize(length as usize, Value::Undefined);
                }
                Ok(())
            }
            Value::Bytes(data) => {
                if let Some(index) = array_index(key) {
                    if let Some(slot) = data.borrow_mut().get_mut(index) {
                        *slot = value.to_uint32() as u8;
                    }
                }
                Ok(())
            }
            Value::Function(closure) => {
                closure.properties.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Native(native) => {
                native.properties.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        }
    }

    fn delete_property(&self, target: &Value, key: &str) -> Result<bool, Exception> {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot convert {} to object",
                target.kind_name()
            ))),
            Value::Object(object) => {
                object.borrow_mut().properties.remove(key);
                Ok(true)
            }
            Value::Array(items) => {
                if let Some(index) = array_index(key) {
                    if let Some(slot) = items.borrow_mut().get_mut(index) {
                        *slot = Value::Undefined;
                    }
                }
                Ok(true)
            }
            Value::Function(closure) => {
                closure.properties.borrow_mut().remove(key);
                Ok(true)
            }
            Value::Native(native) => {
                native.properties.borrow_mut().remove(key);
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    fn has_property(&self, target: &Value, key: &str) -> Result<bool, Exception> {
        match target {
            Value::Object(object) => Ok(Object::has_property(object, key)),
            Value::Array(items) => Ok(key == "length"
                || array_index(key).is_some_and(|i| i < items.borrow().len())
                || Object::has_property(&self.realm.prototypes().array, key)),
            Value::Bytes(data) => Ok(key == "length"
                || array_index(key).is_some_and(|i| i < data.borrow().len())),
            Value::Function(closure) => Ok(closure.properties.borrow().contains_key(key)),
            Value::Native(native) => Ok(native.properties.borrow().contains_key(key)),
            other => Err(self.type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key,
                other.to_display_string()
            ))),
        }
    }

    /// Own enumerable keys, as visited by `for...in` and `Object.keys`
    pub fn own_keys(&self, target: &Value) -> Vec<String> {
        match target {
            Value::Object(object) => object.borrow().properties.keys().cloned().collect(),
            Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
            Value::Bytes(data) => (0..data.borrow().len()).map(|i| i.to_string()).collect(),
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            Value::Function(closure) => closure.properties.borrow().keys().cloned().collect(),
            Value::Native(native) => native.properties.borrow().keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Own enumerable key/value pairs
    pub fn own_entries(&self, target: &Value) -> Vec<(String, Value)> {
        match target {
            Value::Object(object) => object
                .borrow()
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            Value::Bytes(data) => data
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, b)| (i.to_string(), Value::Number(*b as f64)))
                .collect(),
            Value::String(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (i.to_string(), Value::from(c.to_string())))
                .collect(),
            Value::Function(closure) => closure
                .properties
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Items visited by `for...of` and spread
    pub fn iterate(&self, value: &Value) -> Result<Vec<Value>, Exception> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Bytes(data) => Ok(data.borrow().iter().map(|b| Value::Number(*b as f64)).collect()),
            other => Err(self.type_error(format!("{} is not iterable", other.kind_name()))),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

/// String form of a value used as a property key
pub fn property_key(value: &Value) -> String {
    value.to_display_string()
}

/// Canonical array index, if the key is one
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

const MAX_ARRAY_GROWTH: usize = 1 << 24;

fn check_array_growth(interp: &Interpreter, length: usize) -> Result<(), Exception> {
    if length > MAX_ARRAY_GROWTH {
        return Err(interp.range_error("Invalid array length"));
    }
    Ok(())
}

/// Reference values take their string form in `+` and comparisons
fn to_primitive(value: &Value) -> Value {
    if value.identity().is_some() {
        Value::from(value.to_display_string())
    } else {
        value.clone()
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let as_number = |v: &Value| match v {
        Value::Object(object) => match object.borrow().kind {
            ObjectKind::Date(t) => Some(t),
            _ => None,
        },
        _ => None,
    };
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b);
    }

    let left = to_primitive(left);
    let right = to_primitive(right);
    match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Source-like rendering of a callee for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object,
            property: MemberProperty::Named(name),
            ..
        } => format!("{}.{}", describe(object), name),
        Expr::Member { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}
