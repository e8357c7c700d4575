//! Error types for ScriptIt

use thiserror::Error;

use crate::bridge::{BridgeError, CodecError};
use crate::config::ConfigError;
use crate::engine::{Exception, HostFault};

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Bridge fault in handler '{handler}': {message}")]
    BridgeFault { handler: String, message: String },

    #[error("Cannot convert {from} to {to}")]
    Cast { from: String, to: String },

    #[error("Container error: {0}")]
    Container(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BridgeError> for ScriptError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::HandlerNotFound(name) => ScriptError::HandlerNotFound(name),
            BridgeError::Fault { handler, message } => ScriptError::BridgeFault { handler, message },
            BridgeError::Reentrant(handler) => ScriptError::BridgeFault {
                message: format!("handler '{}' re-entered while already running", handler),
                handler,
            },
        }
    }
}

impl From<CodecError> for ScriptError {
    fn from(err: CodecError) -> Self {
        ScriptError::Encoding(err.to_string())
    }
}

/// Uncaught script exceptions cross the boundary here. Errors raised by the
/// host-call machinery keep their category; everything else, including
/// script errors that merely carry a bridge error's name, is a runtime error
/// carrying the script-visible message.
impl From<Exception> for ScriptError {
    fn from(exception: Exception) -> Self {
        let (name, message) = exception.name_and_message();
        match (exception.host_fault(), name) {
            (Some(HostFault::HandlerNotFound), _) => {
                ScriptError::HandlerNotFound(exception.handler().unwrap_or(message))
            }
            (Some(HostFault::Encoding), _) => ScriptError::Encoding(message),
            (Some(HostFault::Bridge), _) => {
                let handler = exception.handler().unwrap_or_default();
                ScriptError::BridgeFault { handler, message }
            }
            (None, Some(name)) => ScriptError::Runtime(format!("{}: {}", name, message)),
            (None, None) => ScriptError::Runtime(format!("Uncaught {}", message)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
