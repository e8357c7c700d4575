//! Function registry
//!
//! Installs script-callable functions into the `ScriptIt.funcs` namespace.
//! Each function forwards its arguments to exactly one bridge handler.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::bridge::codec::{CodecError, PayloadCodec};
use crate::bridge::value::ScriptValue;
use crate::bridge::{BridgeError, CallEnvelope, HostBridge};
use crate::engine::{Exception, HostFault, Interpreter, NativeFunction, ObjectKind, ObjectRef, Realm, Value};

/// Script error name for arguments or results the codec cannot carry
pub const ENCODING_ERROR: &str = "EncodingError";
/// Script error name for calls to a handler the bridge does not know
pub const HANDLER_NOT_FOUND: &str = "HandlerNotFound";
/// Script error name for handlers that failed
pub const BRIDGE_FAULT: &str = "BridgeFault";

pub struct FunctionRegistry {
    bridge: Rc<dyn HostBridge>,
    codec: Rc<dyn PayloadCodec>,
    funcs: ObjectRef,
    /// function name -> handler name
    registered: RefCell<BTreeMap<String, String>>,
}

impl FunctionRegistry {
    /// `funcs` is the namespace object functions are installed into
    pub fn new(bridge: Rc<dyn HostBridge>, codec: Rc<dyn PayloadCodec>, funcs: ObjectRef) -> Self {
        Self {
            bridge,
            codec,
            funcs,
            registered: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn funcs(&self) -> &ObjectRef {
        &self.funcs
    }

    /// Install `funcs[func_name]`, replacing any earlier function of that name
    pub fn register(&self, func_name: &str, handler_name: &str) {
        debug!(
            target: "scriptit::bridge",
            func = func_name,
            handler = handler_name,
            "register function"
        );
        let function = self.make_function(func_name, handler_name);
        self.funcs.borrow_mut().properties.insert(func_name, function);
        self.registered
            .borrow_mut()
            .insert(func_name.to_string(), handler_name.to_string());
    }

    pub fn handler_for(&self, func_name: &str) -> Option<String> {
        self.registered.borrow().get(func_name).cloned()
    }

    /// Registered `(function, handler)` pairs, sorted by function name
    pub fn registered(&self) -> Vec<(String, String)> {
        self.registered
            .borrow()
            .iter()
            .map(|(f, h)| (f.clone(), h.clone()))
            .collect()
    }

    fn make_function(&self, func_name: &str, handler_name: &str) -> Value {
        let bridge = self.bridge.clone();
        let codec = self.codec.clone();
        let handler = handler_name.to_string();

        NativeFunction::new(func_name, move |interp, _this, args| {
            let args = ScriptValue::from_runtime(&Value::array(args))
                .map_err(|e| encoding_exception(interp.realm(), &e))?;
            let payload = codec
                .encode(&args)
                .map_err(|e| encoding_exception(interp.realm(), &e))?;
            let reply = CallEnvelope::new(handler.as_str(), payload)
                .send(&*bridge)
                .map_err(|e| bridge_exception(interp.realm(), &e))?;
            let result = codec
                .decode(&reply)
                .map_err(|e| encoding_exception(interp.realm(), &e))?;
            Ok(result.to_runtime(interp.realm()))
        })
        .into_value()
    }
}

/// Thrown value for a codec failure
pub fn encoding_exception(realm: &Realm, err: &CodecError) -> Exception {
    Exception::new(host_error(realm, HostFault::Encoding, ENCODING_ERROR, &err.to_string()))
}

/// Thrown value for a bridge failure. The error carries the handler name in
/// its `handler` property.
pub fn bridge_exception(realm: &Realm, err: &BridgeError) -> Exception {
    let (fault, name, message) = match err {
        BridgeError::HandlerNotFound(_) => (HostFault::HandlerNotFound, HANDLER_NOT_FOUND, err.to_string()),
        BridgeError::Fault { message, .. } => (HostFault::Bridge, BRIDGE_FAULT, message.clone()),
        BridgeError::Reentrant(_) => (HostFault::Bridge, BRIDGE_FAULT, err.to_string()),
    };
    let error = host_error(realm, fault, name, &message);
    if let Value::Object(object) = &error {
        object
            .borrow_mut()
            .properties
            .insert("handler", Value::from(err.handler()));
    }
    Exception::new(error)
}

fn host_error(realm: &Realm, fault: HostFault, name: &str, message: &str) -> Value {
    let error = realm.make_error(name, message);
    if let Value::Object(object) = &error {
        object.borrow_mut().kind = ObjectKind::HostError(fault);
    }
    error
}

/// Handler name argument of a bridge primitive
pub(crate) fn handler_name_arg(interp: &Interpreter, value: &Value) -> Result<String, Exception> {
    match value {
        Value::String(name) => Ok(name.to_string()),
        other => Err(interp.type_error(format!(
            "handler name must be a string, got {}",
            other.kind_name()
        ))),
    }
}
