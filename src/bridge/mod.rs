//! Host-call bridge
//!
//! Scripts reach host code through one synchronous primitive:
//! `invoke(handler, payload) -> payload`. The bridge is injected when a
//! scripting environment is built. [`EchoBridge`] answers every call with its
//! own payload; [`HandlerTable`] dispatches to named host handlers.

pub mod codec;
pub mod registry;
pub mod value;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

pub use codec::{codec_for, BinaryCodec, CodecError, PayloadCodec, PayloadProfile, TextCodec};
pub use registry::FunctionRegistry;
pub use value::{ObjectMap, ScriptValue};

/// Encoded data crossing the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn profile(&self) -> PayloadProfile {
        match self {
            Payload::Text(_) => PayloadProfile::Text,
            Payload::Binary(_) => PayloadProfile::Binary,
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

/// One bridge call: the handler to run and its encoded argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEnvelope {
    pub handler: String,
    pub payload: Payload,
}

impl CallEnvelope {
    pub fn new(handler: impl Into<String>, payload: Payload) -> Self {
        Self {
            handler: handler.into(),
            payload,
        }
    }

    /// Deliver the envelope; it is consumed
    pub fn send<B: HostBridge + ?Sized>(self, bridge: &B) -> Result<Payload, BridgeError> {
        debug!(
            target: "scriptit::bridge",
            handler = %self.handler,
            bytes = self.payload.len(),
            "bridge invoke"
        );
        bridge.invoke(&self.handler, self.payload)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Can't get unregistered handler: {0}")]
    HandlerNotFound(String),

    #[error("handler '{handler}' failed: {message}")]
    Fault { handler: String, message: String },

    #[error("handler '{0}' called while another handler is running")]
    Reentrant(String),
}

impl BridgeError {
    pub fn handler(&self) -> &str {
        match self {
            BridgeError::HandlerNotFound(handler)
            | BridgeError::Fault { handler, .. }
            | BridgeError::Reentrant(handler) => handler,
        }
    }
}

/// Synchronous host entry point. Calls block until the host answers.
pub trait HostBridge {
    fn invoke(&self, handler: &str, payload: Payload) -> Result<Payload, BridgeError>;
}

impl<B: HostBridge + ?Sized> HostBridge for Rc<B> {
    fn invoke(&self, handler: &str, payload: Payload) -> Result<Payload, BridgeError> {
        (**self).invoke(handler, payload)
    }
}

/// Returns every payload unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBridge;

impl HostBridge for EchoBridge {
    fn invoke(&self, _handler: &str, payload: Payload) -> Result<Payload, BridgeError> {
        Ok(payload)
    }
}

/// A host handler: encoded argument in, encoded result or diagnostic out
pub type CoreHandler = Box<dyn FnMut(Payload) -> Result<Payload, String>>;

/// Bridge backed by named host handlers.
///
/// Only one handler runs at a time; a call arriving while a handler is still
/// running is rejected with [`BridgeError::Reentrant`].
#[derive(Default)]
pub struct HandlerTable {
    handlers: RefCell<HashMap<String, Rc<RefCell<CoreHandler>>>>,
    running: Cell<bool>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handler for `name`
    pub fn register(&self, name: impl Into<String>, handler: CoreHandler) {
        let name = name.into();
        debug!(target: "scriptit::bridge", handler = %name, "register core handler");
        self.handlers
            .borrow_mut()
            .insert(name, Rc::new(RefCell::new(handler)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    /// Registered handler names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Clears the running flag however the handler exits, unwinding included
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl HostBridge for HandlerTable {
    fn invoke(&self, handler: &str, payload: Payload) -> Result<Payload, BridgeError> {
        let entry = self
            .handlers
            .borrow()
            .get(handler)
            .cloned()
            .ok_or_else(|| BridgeError::HandlerNotFound(handler.to_string()))?;

        if self.running.replace(true) {
            return Err(BridgeError::Reentrant(handler.to_string()));
        }
        let result = {
            let _running = RunningGuard(&self.running);
            match entry.try_borrow_mut() {
                Ok(mut run) => run(payload),
                Err(_) => Err(format!("handler '{}' is already running", handler)),
            }
        };

        result.map_err(|message| {
            debug!(target: "scriptit::bridge", handler, %message, "handler fault");
            BridgeError::Fault {
                handler: handler.to_string(),
                message,
            }
        })
    }
}
