//! Script engine: runtime values, scopes, the ambient realm and the interpreter

pub mod builtins;
pub mod environment;
pub mod executor;
pub mod realm;
pub mod value;

pub use environment::{GlobalScope, Scope};
pub use executor::{ExecutionLimits, Interpreter};
pub use realm::Realm;
pub use value::{Exception, HostFault, NativeFunction, Object, ObjectKind, ObjectRef, Value};
