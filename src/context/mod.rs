//! Embedding context
//!
//! A [`ScriptingEnvironment`] owns everything one sandboxed script world
//! needs: the ambient realm, an isolation view over its own container, the
//! host bridge, the payload codec and the function registry. The container
//! starts out holding the `ScriptIt` namespace:
//!
//! - `ScriptIt.core.callToRust(handler, data)` sends an already encoded
//!   payload straight to the bridge (a string in the text profile, a
//!   `Uint8Array` in the binary profile) and returns the raw reply
//! - `ScriptIt.core.registerFunc(funcName, handler)` registers a function
//!   from script code
//! - `ScriptIt.funcs` holds the registered functions

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::bridge::registry::{bridge_exception, encoding_exception, handler_name_arg};
use crate::bridge::{
    codec_for, BridgeError, CallEnvelope, CodecError, FunctionRegistry, HandlerTable, HostBridge, Payload, PayloadCodec,
    PayloadProfile, ScriptValue,
};
use crate::config::SandboxConfig;
use crate::engine::builtins::arg;
use crate::engine::{ExecutionLimits, GlobalScope, NativeFunction, ObjectRef, Realm, Value};
use crate::error::{Result, ScriptError};
use crate::script::{compile, compile_expression, CompiledUnit};
use crate::security::{AllowList, IsolationView, Profile};

/// Container name of the bootstrap namespace
pub const NAMESPACE: &str = "ScriptIt";

pub struct ScriptingEnvironment<B: HostBridge + 'static = HandlerTable> {
    config: SandboxConfig,
    bridge: Rc<B>,
    codec: Rc<dyn PayloadCodec>,
    view: Rc<IsolationView>,
    registry: Rc<FunctionRegistry>,
    limits: ExecutionLimits,
}

impl ScriptingEnvironment<HandlerTable> {
    /// Narrow profile, text payloads, empty handler table
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default())
    }

    pub fn with_config(config: SandboxConfig) -> Self {
        Self::with_bridge(config, HandlerTable::new())
    }

    /// Install a host handler reachable through `ScriptIt.core.callToRust`
    /// and registered functions
    pub fn register_core_handler<F>(&mut self, handler_name: &str, handler: F)
    where
        F: FnMut(Payload) -> std::result::Result<Payload, String> + 'static,
    {
        self.bridge.register(handler_name, Box::new(handler));
    }

    /// Expose a host closure as `ScriptIt.funcs[func_name]`.
    ///
    /// The closure receives the call's arguments; its error message becomes
    /// the message of the `BridgeFault` thrown in the script.
    pub fn register_func<F>(&mut self, func_name: &str, mut func: F)
    where
        F: FnMut(&[ScriptValue]) -> std::result::Result<ScriptValue, ScriptError> + 'static,
    {
        let handler_name = format!("func${}${}", func_name, Uuid::new_v4());
        let codec = self.codec.clone();
        self.register_core_handler(&handler_name, move |payload| {
            let args = codec.decode(&payload).map_err(|e| e.to_string())?;
            let args = args
                .as_array()
                .ok_or("Couldn't convert args to an array of values")?;
            let result = func(args).map_err(|e| e.to_string())?;
            codec.encode(&result).map_err(|e| e.to_string())
        });
        self.register(func_name, &handler_name);
    }

    pub fn handler_table(&self) -> &HandlerTable {
        &self.bridge
    }
}

impl Default for ScriptingEnvironment<HandlerTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: HostBridge + 'static> ScriptingEnvironment<B> {
    /// Build an environment around an injected bridge
    pub fn with_bridge(config: SandboxConfig, bridge: B) -> Self {
        let allow_list = config.allow_list();
        Self::with_allow_list(config, allow_list, bridge)
    }

    /// Like [`with_bridge`](ScriptingEnvironment::with_bridge) but with an
    /// explicit allow-list in place of the configured profile's
    pub fn with_allow_list(config: SandboxConfig, allow_list: Arc<AllowList>, bridge: B) -> Self {
        let bridge = Rc::new(bridge);
        let codec: Rc<dyn PayloadCodec> = Rc::from(codec_for(config.sandbox.payload));
        let realm = Rc::new(Realm::new());
        let view = Rc::new(IsolationView::new(allow_list, realm.clone()));

        let funcs = realm.new_object();
        let shared_bridge: Rc<dyn HostBridge> = bridge.clone();
        let registry = Rc::new(FunctionRegistry::new(shared_bridge.clone(), codec.clone(), funcs.clone()));

        let namespace = bootstrap_namespace(&realm, shared_bridge, codec.profile(), &registry, funcs);
        view.write(NAMESPACE, Value::Object(namespace));

        debug!(
            target: "scriptit::context",
            profile = %config.sandbox.profile,
            payload = %config.sandbox.payload,
            "scripting environment ready"
        );

        Self {
            limits: config.limits(),
            config,
            bridge,
            codec,
            view,
            registry,
        }
    }

    /// Evaluate source and convert its value for the host
    pub fn eval_expression(&mut self, source: &str) -> Result<ScriptValue> {
        let unit = compile_expression(source)?;
        self.run_compiled(&unit)
    }

    /// Run source for its effects; the completion value is discarded
    pub fn run(&mut self, source: &str) -> Result<()> {
        let unit = compile(source)?;
        unit.invoke(&self.view, &self.limits)?;
        Ok(())
    }

    pub fn compile(&self, source: &str) -> Result<CompiledUnit> {
        compile(source)
    }

    pub fn run_compiled(&mut self, unit: &CompiledUnit) -> Result<ScriptValue> {
        let value = unit.invoke(&self.view, &self.limits)?;
        to_script_value(&value)
    }

    /// Install `ScriptIt.funcs[func_name]` forwarding to `handler_name`
    pub fn register(&mut self, func_name: &str, handler_name: &str) {
        self.registry.register(func_name, handler_name);
    }

    /// Place a host value in the container
    pub fn add_to_global(&mut self, name: &str, value: ScriptValue) {
        let value = value.to_runtime(self.view.realm());
        self.view.write(name, value);
    }

    /// Place a host closure in the container as a global function.
    ///
    /// Unlike [`register_func`](ScriptingEnvironment::register_func) the call
    /// does not go through the bridge or the codec; arguments and the result
    /// are converted directly. An `Err` is thrown in the script as a
    /// `BridgeFault` naming `name`.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&[ScriptValue]) -> std::result::Result<ScriptValue, ScriptError> + 'static,
    {
        debug!(target: "scriptit::context", name, "register global function");
        let func = RefCell::new(func);
        let fn_name = name.to_string();
        let native = NativeFunction::new(name, move |interp, _this, args| {
            let args = args
                .iter()
                .map(ScriptValue::from_runtime)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| encoding_exception(interp.realm(), &e))?;
            let result = match func.try_borrow_mut() {
                Ok(mut run) => run(&args).map_err(|e| e.to_string()),
                Err(_) => Err(format!("'{}' is already running", fn_name)),
            };
            match result {
                Ok(value) => Ok(value.to_runtime(interp.realm())),
                Err(message) => {
                    let err = BridgeError::Fault {
                        handler: fn_name.clone(),
                        message,
                    };
                    Err(bridge_exception(interp.realm(), &err))
                }
            }
        });
        self.view.write(name, native.into_value());
    }

    /// Host form of a container entry; `None` when the name is not there
    pub fn get_global(&self, name: &str) -> Result<Option<ScriptValue>> {
        let value = self.view.container().get(name).cloned();
        value.map(|value| to_script_value(&value)).transpose()
    }

    /// Names currently in the container, sorted
    pub fn container_keys(&self) -> Vec<String> {
        self.view.container().keys().map(str::to_string).collect()
    }

    pub fn profile(&self) -> Profile {
        self.view.profile()
    }

    pub fn payload_profile(&self) -> PayloadProfile {
        self.codec.profile()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn view(&self) -> &Rc<IsolationView> {
        &self.view
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }
}

/// Host form of a script result. Functions have none.
fn to_script_value(value: &Value) -> Result<ScriptValue> {
    if value.is_callable() {
        return Err(ScriptError::Cast {
            from: value.kind_name().to_string(),
            to: "ScriptValue".to_string(),
        });
    }
    ScriptValue::from_runtime(value).map_err(ScriptError::from)
}

fn bootstrap_namespace(
    realm: &Realm,
    bridge: Rc<dyn HostBridge>,
    profile: PayloadProfile,
    registry: &Rc<FunctionRegistry>,
    funcs: ObjectRef,
) -> ObjectRef {
    let call_to_rust = NativeFunction::new("callToRust", move |interp, _this, args| {
        let handler = handler_name_arg(interp, &arg(&args, 0))?;
        let payload = match (profile, arg(&args, 1)) {
            (PayloadProfile::Text, Value::String(text)) => Payload::Text(text.to_string()),
            (PayloadProfile::Binary, Value::Bytes(data)) => {
                let bytes = data.borrow().clone();
                Payload::Binary(bytes)
            }
            (PayloadProfile::Text, other) => {
                return Err(interp.type_error(format!(
                    "callToRust expects string data in the text profile, got {}",
                    other.kind_name()
                )))
            }
            (PayloadProfile::Binary, other) => {
                return Err(interp.type_error(format!(
                    "callToRust expects a Uint8Array in the binary profile, got {}",
                    other.kind_name()
                )))
            }
        };
        let reply = CallEnvelope::new(handler, payload)
            .send(&*bridge)
            .map_err(|e| bridge_exception(interp.realm(), &e))?;
        match (profile, reply) {
            (PayloadProfile::Text, Payload::Text(text)) => Ok(Value::from(text)),
            (PayloadProfile::Binary, Payload::Binary(data)) => Ok(Value::bytes(data)),
            (expected, reply) => {
                let err = CodecError::ProfileMismatch {
                    expected,
                    found: reply.profile(),
                };
                Err(encoding_exception(interp.realm(), &err))
            }
        }
    });

    let registry = registry.clone();
    let register_func = NativeFunction::new("registerFunc", move |interp, _this, args| {
        let func_name = match arg(&args, 0) {
            Value::String(name) => name.to_string(),
            other => {
                return Err(interp.type_error(format!(
                    "function name must be a string, got {}",
                    other.kind_name()
                )))
            }
        };
        let handler = handler_name_arg(interp, &arg(&args, 1))?;
        registry.register(&func_name, &handler);
        Ok(Value::Undefined)
    });

    let core = realm.new_object();
    {
        let mut core = core.borrow_mut();
        core.properties.insert("callToRust", call_to_rust.into_value());
        core.properties.insert("registerFunc", register_func.into_value());
    }

    let namespace = realm.new_object();
    {
        let mut namespace = namespace.borrow_mut();
        namespace.properties.insert("core", Value::Object(core));
        namespace.properties.insert("funcs", Value::Object(funcs));
    }
    namespace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EchoBridge;

    #[test]
    fn test_bootstrap_namespace() {
        let mut env = ScriptingEnvironment::new();
        assert_eq!(env.container_keys(), vec![NAMESPACE]);
        let kinds = env
            .eval_expression(
                "[typeof ScriptIt.core.callToRust, typeof ScriptIt.core.registerFunc, typeof ScriptIt.funcs]",
            )
            .unwrap();
        assert_eq!(
            kinds,
            ScriptValue::Array(vec!["function".into(), "function".into(), "object".into()])
        );
    }

    #[test]
    fn test_defaults() {
        let env = ScriptingEnvironment::default();
        assert_eq!(env.profile(), Profile::Narrow);
        assert_eq!(env.payload_profile(), PayloadProfile::Text);
    }

    #[test]
    fn test_add_to_global() {
        let mut env = ScriptingEnvironment::new();
        env.add_to_global("limit", ScriptValue::Number(3.0));
        assert_eq!(env.eval_expression("limit * 2").unwrap(), ScriptValue::Number(6.0));
        assert_eq!(env.container_keys(), vec![NAMESPACE, "limit"]);
    }

    #[test]
    fn test_get_global() {
        let mut env = ScriptingEnvironment::new();
        env.run("answer = [42]").unwrap();
        assert_eq!(
            env.get_global("answer").unwrap(),
            Some(ScriptValue::Array(vec![ScriptValue::Number(42.0)]))
        );
        assert_eq!(env.get_global("missing").unwrap(), None);
        assert!(env.get_global(NAMESPACE).is_err());
    }

    #[test]
    fn test_undeclared_assignment_persists_between_runs() {
        let mut env = ScriptingEnvironment::new();
        env.run("counter = 1; let local = 5").unwrap();
        env.run("counter += 1").unwrap();
        assert_eq!(env.eval_expression("counter").unwrap(), ScriptValue::Number(2.0));
        assert_eq!(env.eval_expression("typeof local").unwrap(), ScriptValue::from("undefined"));
    }

    #[test]
    fn test_function_results_are_not_convertible() {
        let mut env = ScriptingEnvironment::new();
        let err = env.eval_expression("() => 1").unwrap_err();
        assert!(matches!(err, ScriptError::Cast { .. }));
        assert!(env.run("(() => 1)").is_ok());
    }

    #[test]
    fn test_call_to_rust_with_echo_bridge() {
        let mut env = ScriptingEnvironment::with_bridge(SandboxConfig::default(), EchoBridge);
        let value = env.eval_expression("ScriptIt.core.callToRust('any', '[1,2]')").unwrap();
        assert_eq!(value, ScriptValue::from("[1,2]"));
    }

    #[test]
    fn test_call_to_rust_checks_data_type() {
        let mut env = ScriptingEnvironment::with_bridge(SandboxConfig::default(), EchoBridge);
        let value = env
            .eval_expression("try { ScriptIt.core.callToRust('any', 5) } catch (e) { e.name }")
            .unwrap();
        assert_eq!(value, ScriptValue::from("TypeError"));
    }

    #[test]
    fn test_call_to_rust_binary_profile() {
        let config = SandboxConfig::default()
            .with_profile(Profile::Broad)
            .with_payload(PayloadProfile::Binary);
        let mut env = ScriptingEnvironment::with_config(config);
        env.register_core_handler("reverse", |payload| match payload {
            Payload::Binary(mut data) => {
                data.reverse();
                Ok(Payload::Binary(data))
            }
            Payload::Text(_) => Err("binary only".to_string()),
        });
        let value = env
            .eval_expression("ScriptIt.core.callToRust('reverse', new Uint8Array([1, 2, 3]))")
            .unwrap();
        assert_eq!(value, ScriptValue::Bytes(vec![3, 2, 1]));
    }

    #[test]
    fn test_register_func_binary_round_trip() {
        let config = SandboxConfig::default()
            .with_profile(Profile::Broad)
            .with_payload(PayloadProfile::Binary);
        let mut env = ScriptingEnvironment::with_config(config);
        env.register_func("len", |args| match args {
            [ScriptValue::Bytes(data)] => Ok(ScriptValue::Number(data.len() as f64)),
            _ => Err(ScriptError::Runtime("expected bytes".to_string())),
        });
        let value = env.eval_expression("ScriptIt.funcs.len(new Uint8Array(4))").unwrap();
        assert_eq!(value, ScriptValue::Number(4.0));

        let (func, handler) = env.registry().registered().remove(0);
        assert_eq!(func, "len");
        assert!(handler.starts_with("func$len$"));
        assert!(env.handler_table().contains(&handler));
    }

    #[test]
    fn test_script_errors_cannot_pose_as_bridge_errors() {
        let mut env = ScriptingEnvironment::with_config(SandboxConfig::default().with_profile(Profile::Broad));
        for name in ["HandlerNotFound", "EncodingError", "BridgeFault"] {
            let source = format!("const e = new Error('forged'); e.name = '{}'; throw e", name);
            match env.run(&source).unwrap_err() {
                ScriptError::Runtime(message) => assert_eq!(message, format!("{}: forged", name)),
                other => panic!("{} was classified as {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_rethrown_bridge_error_keeps_its_category() {
        let mut env = ScriptingEnvironment::new();
        let err = env
            .run("try { ScriptIt.core.callToRust('missing', '') } catch (e) { throw e }")
            .unwrap_err();
        assert!(matches!(err, ScriptError::HandlerNotFound(ref handler) if handler == "missing"), "{:?}", err);
    }

    #[test]
    fn test_script_side_registration() {
        let mut env = ScriptingEnvironment::new();
        env.register_core_handler("double", |payload| {
            let text = payload.as_text().unwrap_or("[]").to_string();
            let args: Vec<f64> = serde_json::from_str(&text).map_err(|e| e.to_string())?;
            Ok(Payload::Text((args[0] * 2.0).to_string()))
        });
        env.run("ScriptIt.core.registerFunc('double', 'double')").unwrap();
        assert_eq!(
            env.eval_expression("ScriptIt.funcs.double(21)").unwrap(),
            ScriptValue::Number(42.0)
        );
    }
}
