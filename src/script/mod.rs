//! Script compilation, execution and pre-flight validation

pub mod compiler;
pub mod runner;
pub mod validator;

pub use compiler::{compile, compile_expression, CompiledUnit};
pub use runner::{explain_script, ScriptResult, ScriptRunner};
pub use validator::{
    has_errors, has_warnings, validate_script, ScriptValidationError, ValidationOptions,
    ValidationSeverity,
};
