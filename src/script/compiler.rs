//! Script compiler
//!
//! Compilation only parses; nothing runs until a unit is invoked against an
//! isolation view.

use std::rc::Rc;

use tracing::debug;

use crate::engine::{ExecutionLimits, GlobalScope, Interpreter, Value};
use crate::error::{Result, ScriptError};
use crate::parser::{parse_expression, parse_script, Script, Statement};
use crate::security::IsolationView;

/// A parsed program, cheap to clone and stateless between invocations
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    script: Rc<Script>,
}

impl CompiledUnit {
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Run the unit with `view` as its outermost scope.
    ///
    /// Declared names stay in the unit's own scopes; free identifiers read
    /// and write through the view. Returns the completion value.
    pub fn invoke(&self, view: &Rc<IsolationView>, limits: &ExecutionLimits) -> Result<Value> {
        let global: Rc<dyn GlobalScope> = view.clone();
        let mut interp = Interpreter::new(view.realm().clone(), global, *limits);
        interp.run(&self.script).map_err(|exception| {
            debug!(target: "scriptit::script", %exception, "uncaught exception");
            ScriptError::from(exception)
        })
    }
}

pub fn compile(source: &str) -> Result<CompiledUnit> {
    let script = parse_script(source).inspect_err(log_failure)?;
    Ok(CompiledUnit {
        script: Rc::new(script),
    })
}

/// Compile source meant to produce one value.
///
/// A lone expression is taken as is. Otherwise the source is compiled as a
/// script whose completion value is the result, except that a source which
/// only parses as a block (`{}` or `{a: 1}`) is read as an object literal.
pub fn compile_expression(source: &str) -> Result<CompiledUnit> {
    if let Ok(expr) = parse_expression(source) {
        return Ok(unit_of(vec![Statement::Expression(expr)]));
    }

    let object_literal = || {
        let trimmed = source.trim().trim_end_matches(';');
        parse_expression(&format!("({})", trimmed)).ok()
    };

    match parse_script(source) {
        Ok(script) => match script.statements.as_slice() {
            [Statement::Block(_)] => Ok(object_literal()
                .map(|expr| unit_of(vec![Statement::Expression(expr)]))
                .unwrap_or_else(|| unit_of(script.statements))),
            _ => Ok(unit_of(script.statements)),
        },
        Err(err) => match object_literal() {
            Some(expr) => Ok(unit_of(vec![Statement::Expression(expr)])),
            None => {
                log_failure(&err);
                Err(err)
            }
        },
    }
}

fn unit_of(statements: Vec<Statement>) -> CompiledUnit {
    CompiledUnit {
        script: Rc::new(Script { statements }),
    }
}

fn log_failure(err: &ScriptError) {
    debug!(target: "scriptit::script", error = %err, "compile failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Realm;
    use crate::security::AllowList;

    fn view() -> Rc<IsolationView> {
        Rc::new(IsolationView::new(AllowList::narrow(), Rc::new(Realm::new())))
    }

    fn eval(src: &str) -> Result<Value> {
        compile_expression(src)?.invoke(&view(), &ExecutionLimits::default())
    }

    #[test]
    fn test_compile_error() {
        assert!(matches!(compile("import async return"), Err(ScriptError::Compile(_))));
        assert!(matches!(compile_expression("let = ;"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn test_compile_has_no_side_effects() {
        let view = view();
        let _unit = compile("leaked = 1").unwrap();
        assert!(!view.container().contains("leaked"));
    }

    #[test]
    fn test_completion_value() {
        assert_eq!(eval("12 + 3").unwrap().to_number(), 15.0);
        assert_eq!(eval("let a = 2; a * 10").unwrap().to_number(), 20.0);
        assert_eq!(eval("1; 2").unwrap().to_number(), 2.0);
        assert!(matches!(eval("let x = 1").unwrap(), Value::Undefined));
    }

    #[test]
    fn test_object_literal_expression() {
        let value = eval("{a: 1}").unwrap();
        assert_eq!(value.kind_name(), "object");
        assert_eq!(eval("{}").unwrap().kind_name(), "object");
    }

    #[test]
    fn test_same_source_same_behaviour() {
        let first = compile("count = (typeof count === 'number' ? count : 0) + 1; count").unwrap();
        let second = compile("count = (typeof count === 'number' ? count : 0) + 1; count").unwrap();
        assert_eq!(first, second);

        let limits = ExecutionLimits::default();
        assert_eq!(first.invoke(&view(), &limits).unwrap().to_number(), 1.0);
        assert_eq!(second.invoke(&view(), &limits).unwrap().to_number(), 1.0);
    }

    #[test]
    fn test_units_are_reusable_against_one_view() {
        let view = view();
        let unit = compile("total = (total ?? 0) + 5; total").unwrap();
        let limits = ExecutionLimits::default();
        unit.invoke(&view, &limits).unwrap();
        assert_eq!(unit.invoke(&view, &limits).unwrap().to_number(), 10.0);
    }

    #[test]
    fn test_uncaught_error_becomes_runtime_error() {
        let broad = Rc::new(IsolationView::new(AllowList::broad(), Rc::new(Realm::new())));
        let err = compile("throw new TypeError('nope')")
            .unwrap()
            .invoke(&broad, &ExecutionLimits::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: TypeError: nope");
        let err = eval("throw 'plain'").unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_call_depth_is_limited() {
        let unit = compile("function f(n) { return f(n + 1) } f(0)").unwrap();
        let limits = ExecutionLimits { max_call_depth: 32 };
        let err = unit.invoke(&view(), &limits).unwrap_err();
        assert!(err.to_string().contains("RangeError"));
    }
}
