//! Script runner for executing .js files in a sandbox

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::bridge::ScriptValue;
use crate::config::SandboxConfig;
use crate::context::ScriptingEnvironment;
use crate::error::{Result, ScriptError};
use crate::parser::{ForInit, Script, Statement};

/// Result of script execution
#[derive(Debug)]
pub struct ScriptResult {
    /// Completion value of the script, when it had a host form
    pub value: Option<ScriptValue>,
    /// Top-level statements in the script
    pub statements: usize,
    /// Whether the script completed successfully
    pub success: bool,
    /// Error message if script failed
    pub error: Option<String>,
}

/// Runs script files inside one scripting environment
pub struct ScriptRunner {
    env: ScriptingEnvironment,
    /// Script arguments passed via --arg, exposed to the script as `args`
    script_args: BTreeMap<String, String>,
}

impl ScriptRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_environment(ScriptingEnvironment::with_config(config))
    }

    /// Run inside an existing environment, keeping its handlers
    pub fn with_environment(env: ScriptingEnvironment) -> Self {
        Self {
            env,
            script_args: BTreeMap::new(),
        }
    }

    /// Set script arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        for arg in args {
            if let Some((key, value)) = arg.split_once('=') {
                self.script_args.insert(key.to_string(), value.to_string());
            }
        }
        self
    }

    pub fn environment(&mut self) -> &mut ScriptingEnvironment {
        &mut self.env
    }

    /// Load and run a script file
    pub fn run_file(&mut self, path: &Path) -> Result<ScriptResult> {
        if path.extension().is_none_or(|e| e != "js") {
            return Err(ScriptError::Runtime(format!(
                "Script file must have .js extension: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        info!(target: "scriptit::script", path = %path.display(), "running script");
        self.run_source(&content)
    }

    /// Run script source. Compile errors are returned; runtime failures are
    /// reported in the result.
    pub fn run_source(&mut self, source: &str) -> Result<ScriptResult> {
        let unit = self.env.compile(source)?;
        self.inject_script_args();
        let statements = unit.script().statements.len();

        match self.env.run_compiled(&unit) {
            Ok(value) => Ok(ScriptResult {
                value: Some(value),
                statements,
                success: true,
                error: None,
            }),
            Err(ScriptError::Cast { .. }) => Ok(ScriptResult {
                value: None,
                statements,
                success: true,
                error: None,
            }),
            Err(e) => Ok(ScriptResult {
                value: None,
                statements,
                success: false,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Inject script arguments as the `args` object
    fn inject_script_args(&mut self) {
        if self.script_args.is_empty() {
            return;
        }
        let args = self
            .script_args
            .iter()
            .map(|(key, value)| {
                // Try number, then boolean; fall back to string
                let value = if let Ok(n) = value.parse::<f64>() {
                    ScriptValue::Number(n)
                } else if value.eq_ignore_ascii_case("true") {
                    ScriptValue::Bool(true)
                } else if value.eq_ignore_ascii_case("false") {
                    ScriptValue::Bool(false)
                } else {
                    ScriptValue::String(value.clone())
                };
                (key.clone(), value)
            })
            .collect();
        self.env.add_to_global("args", ScriptValue::Object(args));
    }
}

/// One-line outline of each top-level statement
pub fn explain_script(script: &Script) -> Vec<String> {
    script
        .statements
        .iter()
        .enumerate()
        .map(|(i, statement)| format!("{}. {}", i + 1, explain_statement(statement)))
        .collect()
}

fn explain_statement(statement: &Statement) -> String {
    match statement {
        Statement::Expression(_) => "expression".to_string(),
        Statement::Declaration(decl) => {
            let names: Vec<&str> = decl.bindings.iter().map(|b| b.name.as_str()).collect();
            format!("{} {}", decl.kind, names.join(", "))
        }
        Statement::Function(def) => format!(
            "function {} ({} params)",
            def.name.as_deref().unwrap_or("<anonymous>"),
            def.params.len()
        ),
        Statement::If(stmt) => format!(
            "if{}",
            if stmt.alternate.is_some() { " / else" } else { "" }
        ),
        Statement::While { .. } => "while loop".to_string(),
        Statement::DoWhile { .. } => "do/while loop".to_string(),
        Statement::For(lp) => match &lp.init {
            Some(ForInit::Declaration(decl)) => format!("for loop ({})", decl.kind),
            _ => "for loop".to_string(),
        },
        Statement::ForOf(lp) => format!("for {} of ...", lp.name),
        Statement::ForIn(lp) => format!("for {} in ...", lp.name),
        Statement::Return(_) => "return".to_string(),
        Statement::Break => "break".to_string(),
        Statement::Continue => "continue".to_string(),
        Statement::Throw(_) => "throw".to_string(),
        Statement::Try(stmt) => format!(
            "try ({} statements){}{}",
            stmt.block.len(),
            if stmt.handler.is_some() { " / catch" } else { "" },
            if stmt.finalizer.is_some() { " / finally" } else { "" }
        ),
        Statement::Block(body) => format!("block ({} statements)", body.len()),
        Statement::Empty => "empty".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    #[test]
    fn test_script_runner_with_args() {
        let runner = ScriptRunner::new(SandboxConfig::default())
            .with_args(vec!["path=/tmp".to_string(), "threshold=80".to_string(), "bad".to_string()]);
        assert_eq!(runner.script_args.get("path"), Some(&"/tmp".to_string()));
        assert_eq!(runner.script_args.get("threshold"), Some(&"80".to_string()));
        assert_eq!(runner.script_args.len(), 2);
    }

    #[test]
    fn test_args_are_typed() {
        let mut runner = ScriptRunner::new(SandboxConfig::default())
            .with_args(vec!["n=4".to_string(), "loud=true".to_string()]);
        let result = runner.run_source("args.loud ? args.n * 2 : 0").unwrap();
        assert!(result.success);
        assert_eq!(result.value, Some(ScriptValue::Number(8.0)));
    }

    #[test]
    fn test_runtime_failure_is_reported() {
        let mut runner = ScriptRunner::new(SandboxConfig::default());
        let result = runner.run_source("let a = 1;\nthrow 'boom'").unwrap();
        assert!(!result.success);
        assert_eq!(result.statements, 2);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[test]
    fn test_compile_failure_is_an_error() {
        let mut runner = ScriptRunner::new(SandboxConfig::default());
        assert!(matches!(runner.run_source("let = ;"), Err(ScriptError::Compile(_))));
    }

    #[test]
    fn test_function_result_is_success() {
        let mut runner = ScriptRunner::new(SandboxConfig::default());
        let result = runner.run_source("function f() {}\nf").unwrap();
        assert!(result.success);
        assert!(result.value.is_none());
    }

    #[test]
    fn test_rejects_other_extensions() {
        let mut runner = ScriptRunner::new(SandboxConfig::default());
        assert!(runner.run_file(Path::new("script.txt")).is_err());
    }

    #[test]
    fn test_explain_script() {
        let script = parse_script("const a = 1, b = 2\nfunction f(x, y) { return x }\nfor (const k of [1]) {}").unwrap();
        let explanations = explain_script(&script);
        assert_eq!(explanations.len(), 3);
        assert_eq!(explanations[0], "1. const a, b");
        assert_eq!(explanations[1], "2. function f (2 params)");
        assert_eq!(explanations[2], "3. for k of ...");
    }
}
