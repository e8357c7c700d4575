//! ScriptIt - embed untrusted scripts behind an allow-listed global scope
//!
//! Scripts run inside an isolation view: every global lookup first checks a
//! per-environment container, then an allow-list of ambient built-ins, and
//! otherwise sees `undefined`. The host exposes functionality through a
//! single synchronous bridge carrying text (JSON) or binary payloads.
//!
//! # Example
//!
//! ```no_run
//! use scriptit::{ScriptValue, ScriptingEnvironment};
//!
//! let mut env = ScriptingEnvironment::new();
//! env.register_func("avg", |args| {
//!     let sum: f64 = args.iter().filter_map(ScriptValue::as_f64).sum();
//!     Ok(ScriptValue::Number(sum / args.len() as f64))
//! });
//! let value = env.eval_expression("ScriptIt.funcs.avg(10, 16)").unwrap();
//! assert_eq!(value, ScriptValue::Number(13.0));
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod container;
pub mod context;
pub mod engine;
pub mod error;
pub mod output;
pub mod parser;
pub mod script;
pub mod security;

#[cfg(feature = "repl")]
pub mod repl;

pub use bridge::{
    BridgeError, CallEnvelope, EchoBridge, FunctionRegistry, HandlerTable, HostBridge, Payload,
    ObjectMap, PayloadProfile, ScriptValue,
};
pub use config::{ConfigError, SandboxConfig};
pub use container::{ContainerManager, SandboxContainer};
pub use context::{ScriptingEnvironment, NAMESPACE};
pub use error::{Result, ScriptError};
pub use output::{format_output, Output, OutputFormat};
pub use parser::{parse_script, Script};
pub use script::{compile, compile_expression, validate_script, CompiledUnit, ScriptResult, ScriptRunner};
pub use security::{AllowList, IsolationView, Profile};
