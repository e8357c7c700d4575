//! Static pre-flight analysis of scripts
//!
//! Reports free identifiers the isolation view will not resolve, references
//! to the global object, and excessive nesting, without running anything.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::NAMESPACE;
use crate::parser::{
    Argument, Expr, ForInit, FunctionBody, FunctionDef, MemberProperty, ObjectMember, PropertyKey,
    Script, Statement, TemplatePart,
};
use crate::security::{is_global_self_reference, AllowList};

/// Issue found during validation
#[derive(Debug, Clone)]
pub struct ScriptValidationError {
    /// 1-based index of the top-level statement the issue is in
    pub statement: Option<usize>,
    pub message: String,
    pub severity: ValidationSeverity,
}

/// Severity level for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ScriptValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            ValidationSeverity::Error => "ERROR",
            ValidationSeverity::Warning => "WARNING",
        };
        if let Some(statement) = self.statement {
            write!(f, "{} (statement {}): {}", prefix, statement, self.message)
        } else {
            write!(f, "{}: {}", prefix, self.message)
        }
    }
}

/// Validation options
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Names passed through to the ambient realm
    pub allow_list: Arc<AllowList>,
    /// Names the host places in the container before the script runs
    pub host_globals: Vec<String>,
    /// Maximum nesting of blocks and functions
    pub max_nesting_depth: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            allow_list: AllowList::narrow(),
            host_globals: vec![NAMESPACE.to_string()],
            max_nesting_depth: 32,
        }
    }
}

/// Validate a script against the sandbox it will run in
pub fn validate_script(script: &Script, options: &ValidationOptions) -> Vec<ScriptValidationError> {
    let mut assigned = HashSet::new();
    for statement in &script.statements {
        collect_assigned_statement(statement, &mut assigned);
    }

    let mut validator = Validator {
        options,
        assigned,
        scopes: vec![declared_names(&script.statements, &[])],
        reported: HashSet::new(),
        errors: Vec::new(),
        statement: 0,
    };
    for (i, statement) in script.statements.iter().enumerate() {
        validator.statement = i + 1;
        validator.check_statement(statement, 0);
    }
    validator.errors
}

/// Check if a script has any validation errors (not just warnings)
pub fn has_errors(errors: &[ScriptValidationError]) -> bool {
    errors
        .iter()
        .any(|e| e.severity == ValidationSeverity::Error)
}

/// Check if a script has any validation warnings
pub fn has_warnings(errors: &[ScriptValidationError]) -> bool {
    errors
        .iter()
        .any(|e| e.severity == ValidationSeverity::Warning)
}

struct Validator<'a> {
    options: &'a ValidationOptions,
    /// Free names the script itself assigns; they land in the container
    assigned: HashSet<String>,
    /// Names declared by each enclosing function, innermost last
    scopes: Vec<HashSet<String>>,
    /// Free names already reported, so each is reported once
    reported: HashSet<String>,
    errors: Vec<ScriptValidationError>,
    statement: usize,
}

impl Validator<'_> {
    fn push(&mut self, severity: ValidationSeverity, message: String) {
        self.errors.push(ScriptValidationError {
            statement: Some(self.statement),
            message,
            severity,
        });
    }

    fn enter(&mut self, depth: usize) -> bool {
        if depth > self.options.max_nesting_depth {
            self.push(
                ValidationSeverity::Error,
                format!("Maximum nesting depth ({}) exceeded", self.options.max_nesting_depth),
            );
            return false;
        }
        true
    }

    fn check_statements(&mut self, statements: &[Statement], depth: usize) {
        for statement in statements {
            self.check_statement(statement, depth);
        }
    }

    fn check_statement(&mut self, statement: &Statement, depth: usize) {
        if !self.enter(depth) {
            return;
        }
        match statement {
            Statement::Expression(expr) | Statement::Throw(expr) => self.check_expr(expr, depth),
            Statement::Declaration(decl) => {
                for binding in &decl.bindings {
                    if let Some(init) = &binding.init {
                        self.check_expr(init, depth);
                    }
                }
            }
            Statement::Function(def) => self.check_function(def, depth + 1),
            Statement::If(stmt) => {
                self.check_expr(&stmt.test, depth);
                self.check_statement(&stmt.consequent, depth + 1);
                if let Some(alternate) = &stmt.alternate {
                    self.check_statement(alternate, depth + 1);
                }
            }
            Statement::While { test, body } | Statement::DoWhile { body, test } => {
                self.check_expr(test, depth);
                self.check_statement(body, depth + 1);
            }
            Statement::For(lp) => {
                match &lp.init {
                    Some(ForInit::Declaration(decl)) => {
                        for init in decl.bindings.iter().filter_map(|b| b.init.as_ref()) {
                            self.check_expr(init, depth);
                        }
                    }
                    Some(ForInit::Expression(expr)) => self.check_expr(expr, depth),
                    None => {}
                }
                for expr in lp.test.iter().chain(lp.update.iter()) {
                    self.check_expr(expr, depth);
                }
                self.check_statement(&lp.body, depth + 1);
            }
            Statement::ForOf(lp) | Statement::ForIn(lp) => {
                self.check_expr(&lp.source, depth);
                self.check_statement(&lp.body, depth + 1);
            }
            Statement::Return(expr) => {
                if let Some(expr) = expr {
                    self.check_expr(expr, depth);
                }
            }
            Statement::Try(stmt) => {
                self.check_statements(&stmt.block, depth + 1);
                if let Some(handler) = &stmt.handler {
                    self.check_statements(&handler.body, depth + 1);
                }
                if let Some(finalizer) = &stmt.finalizer {
                    self.check_statements(finalizer, depth + 1);
                }
            }
            Statement::Block(body) => self.check_statements(body, depth + 1),
            Statement::Break | Statement::Continue | Statement::Empty => {}
        }
    }

    fn check_function(&mut self, def: &FunctionDef, depth: usize) {
        if !self.enter(depth) {
            return;
        }
        let params: Vec<&str> = def.params.iter().map(|p| p.name.as_str()).collect();
        let mut scope = match &def.body {
            FunctionBody::Block(body) => declared_names(body, &params),
            FunctionBody::Expression(_) => params.iter().map(|p| p.to_string()).collect(),
        };
        if let Some(name) = &def.name {
            scope.insert(name.clone());
        }
        self.scopes.push(scope);

        for default in def.params.iter().filter_map(|p| p.default.as_ref()) {
            self.check_expr(default, depth);
        }
        match &def.body {
            FunctionBody::Block(body) => self.check_statements(body, depth),
            FunctionBody::Expression(expr) => self.check_expr(expr, depth),
        }
        self.scopes.pop();
    }

    fn check_arguments(&mut self, arguments: &[Argument], depth: usize) {
        for argument in arguments {
            self.check_expr(&argument.value, depth);
        }
    }

    fn check_expr(&mut self, expr: &Expr, depth: usize) {
        match expr {
            Expr::Identifier(name) => self.check_identifier(name),
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Substitution(expr) = part {
                        self.check_expr(expr, depth);
                    }
                }
            }
            Expr::Array(items) => self.check_arguments(items, depth),
            Expr::Object(members) => {
                for member in members {
                    match member {
                        ObjectMember::Property { key, value } => {
                            if let PropertyKey::Computed(key) = key {
                                self.check_expr(key, depth);
                            }
                            self.check_expr(value, depth);
                        }
                        ObjectMember::Spread(expr) => self.check_expr(expr, depth),
                    }
                }
            }
            Expr::Function(def) => self.check_function(def, depth + 1),
            Expr::Member { object, property, .. } => {
                self.check_expr(object, depth);
                if let MemberProperty::Computed(key) = property {
                    self.check_expr(key, depth);
                }
            }
            Expr::Call { callee, arguments, .. } | Expr::New { callee, arguments } => {
                if matches!(callee.as_ref(), Expr::Identifier(name) if name == "Function" && self.is_free("Function")) {
                    self.push(
                        ValidationSeverity::Warning,
                        "the Function constructor cannot compile code in the sandbox".to_string(),
                    );
                }
                self.check_expr(callee, depth);
                self.check_arguments(arguments, depth);
            }
            Expr::Unary { argument, .. } => self.check_expr(argument, depth),
            Expr::Update { target, .. } => self.check_expr(target, depth),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.check_expr(left, depth);
                self.check_expr(right, depth);
            }
            Expr::Conditional { test, consequent, alternate } => {
                self.check_expr(test, depth);
                self.check_expr(consequent, depth);
                self.check_expr(alternate, depth);
            }
            Expr::Assign { target, value, .. } => {
                // plain assignment targets are writes, not reads
                if !matches!(target.as_ref(), Expr::Identifier(_)) {
                    self.check_expr(target, depth);
                }
                self.check_expr(value, depth);
            }
            Expr::Sequence(items) => {
                for item in items {
                    self.check_expr(item, depth);
                }
            }
            Expr::Number(_)
            | Expr::String(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::This => {}
        }
    }

    fn is_free(&self, name: &str) -> bool {
        !self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn check_identifier(&mut self, name: &str) {
        if !self.is_free(name) || self.reported.contains(name) {
            return;
        }
        if is_global_self_reference(name) {
            self.reported.insert(name.to_string());
            self.push(
                ValidationSeverity::Warning,
                format!("'{}' refers to the global object, which is never visible in the sandbox", name),
            );
            return;
        }
        let visible = self.options.allow_list.is_allowed(name)
            || self.options.host_globals.iter().any(|g| g == name)
            || self.assigned.contains(name);
        if !visible {
            self.reported.insert(name.to_string());
            self.push(
                ValidationSeverity::Warning,
                format!(
                    "'{}' is not visible in the sandbox ({} profile) and reads as undefined",
                    name,
                    self.options.allow_list.profile()
                ),
            );
        }
    }
}

/// Names a function body declares, not descending into nested functions
fn declared_names(body: &[Statement], params: &[&str]) -> HashSet<String> {
    let mut names: HashSet<String> = params.iter().map(|p| p.to_string()).collect();
    for statement in body {
        collect_declared(statement, &mut names);
    }
    names
}

fn collect_declared(statement: &Statement, names: &mut HashSet<String>) {
    match statement {
        Statement::Declaration(decl) => {
            names.extend(decl.bindings.iter().map(|b| b.name.clone()));
        }
        Statement::Function(def) => names.extend(def.name.clone()),
        Statement::If(stmt) => {
            collect_declared(&stmt.consequent, names);
            if let Some(alternate) = &stmt.alternate {
                collect_declared(alternate, names);
            }
        }
        Statement::While { body, .. } | Statement::DoWhile { body, .. } => collect_declared(body, names),
        Statement::For(lp) => {
            if let Some(ForInit::Declaration(decl)) = &lp.init {
                names.extend(decl.bindings.iter().map(|b| b.name.clone()));
            }
            collect_declared(&lp.body, names);
        }
        Statement::ForOf(lp) | Statement::ForIn(lp) => {
            if lp.kind.is_some() {
                names.insert(lp.name.clone());
            }
            collect_declared(&lp.body, names);
        }
        Statement::Try(stmt) => {
            stmt.block.iter().for_each(|s| collect_declared(s, names));
            if let Some(handler) = &stmt.handler {
                names.extend(handler.param.clone());
                handler.body.iter().for_each(|s| collect_declared(s, names));
            }
            if let Some(finalizer) = &stmt.finalizer {
                finalizer.iter().for_each(|s| collect_declared(s, names));
            }
        }
        Statement::Block(body) => body.iter().for_each(|s| collect_declared(s, names)),
        _ => {}
    }
}

/// Every identifier the script assigns to, anywhere
fn collect_assigned_statement(statement: &Statement, names: &mut HashSet<String>) {
    match statement {
        Statement::Expression(expr) | Statement::Throw(expr) | Statement::Return(Some(expr)) => {
            collect_assigned_expr(expr, names)
        }
        Statement::Declaration(decl) => {
            for init in decl.bindings.iter().filter_map(|b| b.init.as_ref()) {
                collect_assigned_expr(init, names);
            }
        }
        Statement::Function(def) => collect_assigned_function(def, names),
        Statement::If(stmt) => {
            collect_assigned_expr(&stmt.test, names);
            collect_assigned_statement(&stmt.consequent, names);
            if let Some(alternate) = &stmt.alternate {
                collect_assigned_statement(alternate, names);
            }
        }
        Statement::While { test, body } | Statement::DoWhile { body, test } => {
            collect_assigned_expr(test, names);
            collect_assigned_statement(body, names);
        }
        Statement::For(lp) => {
            if let Some(ForInit::Expression(expr)) = &lp.init {
                collect_assigned_expr(expr, names);
            }
            for expr in lp.test.iter().chain(lp.update.iter()) {
                collect_assigned_expr(expr, names);
            }
            collect_assigned_statement(&lp.body, names);
        }
        Statement::ForOf(lp) | Statement::ForIn(lp) => {
            if lp.kind.is_none() {
                names.insert(lp.name.clone());
            }
            collect_assigned_statement(&lp.body, names);
        }
        Statement::Try(stmt) => {
            let blocks = std::iter::once(&stmt.block)
                .chain(stmt.handler.as_ref().map(|h| &h.body))
                .chain(stmt.finalizer.as_ref());
            for block in blocks {
                block.iter().for_each(|s| collect_assigned_statement(s, names));
            }
        }
        Statement::Block(body) => body.iter().for_each(|s| collect_assigned_statement(s, names)),
        _ => {}
    }
}

fn collect_assigned_function(def: &FunctionDef, names: &mut HashSet<String>) {
    match &def.body {
        FunctionBody::Block(body) => body.iter().for_each(|s| collect_assigned_statement(s, names)),
        FunctionBody::Expression(expr) => collect_assigned_expr(expr, names),
    }
}

fn collect_assigned_expr(expr: &Expr, names: &mut HashSet<String>) {
    match expr {
        Expr::Assign { target, value, .. } => {
            if let Expr::Identifier(name) = target.as_ref() {
                names.insert(name.clone());
            }
            collect_assigned_expr(value, names);
        }
        Expr::Function(def) => collect_assigned_function(def, names),
        Expr::Call { callee, arguments, .. } | Expr::New { callee, arguments } => {
            collect_assigned_expr(callee, names);
            arguments.iter().for_each(|a| collect_assigned_expr(&a.value, names));
        }
        Expr::Array(items) => items.iter().for_each(|a| collect_assigned_expr(&a.value, names)),
        Expr::Sequence(items) => items.iter().for_each(|e| collect_assigned_expr(e, names)),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_assigned_expr(left, names);
            collect_assigned_expr(right, names);
        }
        Expr::Conditional { test, consequent, alternate } => {
            collect_assigned_expr(test, names);
            collect_assigned_expr(consequent, names);
            collect_assigned_expr(alternate, names);
        }
        Expr::Unary { argument, .. } => collect_assigned_expr(argument, names),
        Expr::Member { object, .. } => collect_assigned_expr(object, names),
        Expr::Object(members) => {
            for member in members {
                match member {
                    ObjectMember::Property { value, .. } | ObjectMember::Spread(value) => {
                        collect_assigned_expr(value, names)
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn validate(src: &str) -> Vec<ScriptValidationError> {
        validate_script(&parse_script(src).unwrap(), &ValidationOptions::default())
    }

    #[test]
    fn test_validate_clean_script() {
        let errors = validate(
            "function avg(xs) { let s = 0; for (const x of xs) { s += x } return s / xs.length }\n\
             total = avg([1, 2, 3]);\n\
             ScriptIt.funcs;\n\
             Math.max(total, NaN)",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_hidden_global_is_reported_once() {
        let errors = validate("console.log(1); console.log(2)");
        assert_eq!(errors.len(), 1);
        assert!(has_warnings(&errors));
        assert!(!has_errors(&errors));
        assert!(errors[0].message.contains("'console'"));
        assert_eq!(errors[0].statement, Some(1));
    }

    #[test]
    fn test_global_object_reference() {
        let errors = validate("const g = globalThis");
        assert!(errors[0].message.contains("global object"));
    }

    #[test]
    fn test_broad_profile_sees_json() {
        let script = parse_script("JSON.stringify([1])").unwrap();
        assert!(has_warnings(&validate_script(&script, &ValidationOptions::default())));
        let options = ValidationOptions {
            allow_list: AllowList::broad(),
            ..Default::default()
        };
        assert!(validate_script(&script, &options).is_empty());
    }

    #[test]
    fn test_function_constructor_warning() {
        let options = ValidationOptions {
            allow_list: AllowList::broad(),
            ..Default::default()
        };
        let errors = validate_script(&parse_script("new Function('return 1')").unwrap(), &options);
        assert!(errors.iter().any(|e| e.message.contains("Function constructor")));
    }

    #[test]
    fn test_nesting_depth() {
        let options = ValidationOptions {
            max_nesting_depth: 2,
            ..Default::default()
        };
        let script = parse_script("if (1) { if (1) { if (1) { 1 } } }").unwrap();
        assert!(has_errors(&validate_script(&script, &options)));
    }

    #[test]
    fn test_display() {
        let errors = validate("\n1;\nmissing");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().starts_with("WARNING (statement 2):"));
    }
}
