use std::cell::RefCell;
use std::rc::Rc;

use scriptit::{
    EchoBridge, PayloadProfile, Profile, SandboxConfig, ScriptError, ScriptValue, ScriptingEnvironment,
};

#[test]
fn test_count_func() {
    let count = Rc::new(RefCell::new(0u32));
    let closure_count = Rc::clone(&count);
    let mut env = ScriptingEnvironment::new();
    env.register_func("count", move |_| {
        *closure_count.borrow_mut() += 1;
        Ok(ScriptValue::Number(f64::from(*closure_count.borrow())))
    });

    let val = env
        .eval_expression(
            "(
                ScriptIt.funcs.count(),
                ScriptIt.funcs.count(),
                ScriptIt.funcs.count()
            )",
        )
        .unwrap();

    assert_eq!(val, ScriptValue::Number(3.0));
}

fn data_and_avg(config: SandboxConfig) -> ScriptValue {
    let count = Rc::new(RefCell::new(0u32));
    let total = Rc::new(RefCell::new(0.0f64));
    let (data_count, data_total) = (Rc::clone(&count), Rc::clone(&total));

    let mut env = ScriptingEnvironment::with_config(config);
    env.register_func("data", move |args| {
        let val = args
            .first()
            .and_then(ScriptValue::as_f64)
            .ok_or_else(|| ScriptError::Runtime("data expects a number".to_string()))?;
        *data_count.borrow_mut() += 1;
        *data_total.borrow_mut() += val;
        Ok(ScriptValue::Null)
    });
    env.register_func("avg", move |_| {
        Ok(ScriptValue::Number(*total.borrow() / f64::from(*count.borrow())))
    });

    env.eval_expression(
        "(
            ScriptIt.funcs.data(12.5),
            ScriptIt.funcs.data(13.0),
            ScriptIt.funcs.data(13.5),
            ScriptIt.funcs.avg()
        )",
    )
    .unwrap()
}

#[test]
fn test_data_and_avg_funcs() {
    assert_eq!(data_and_avg(SandboxConfig::default()), ScriptValue::Number(13.0));
}

#[test]
fn test_data_and_avg_funcs_binary() {
    let config = SandboxConfig::default().with_payload(PayloadProfile::Binary);
    assert_eq!(data_and_avg(config), ScriptValue::Number(13.0));
}

#[test]
fn test_structured_arguments_round_trip() {
    let mut env = ScriptingEnvironment::new();
    env.register_func("echo", |args| Ok(ScriptValue::Array(args.to_vec())));
    let val = env
        .eval_expression("ScriptIt.funcs.echo({a: [1, 'two']}, null, true)[0].a[1]")
        .unwrap();
    assert_eq!(val, ScriptValue::String("two".to_string()));
}

#[test]
fn test_func_error_is_a_bridge_fault() {
    let mut env = ScriptingEnvironment::new();
    env.register_func("strict", |_| Err(ScriptError::Runtime("no thanks".to_string())));
    match env.run("ScriptIt.funcs.strict()") {
        Err(ScriptError::BridgeFault { message, .. }) => assert!(message.contains("no thanks")),
        other => panic!("expected BridgeFault, got {:?}", other),
    }
}

#[test]
fn test_functions_cannot_cross_the_bridge() {
    let mut env = ScriptingEnvironment::new();
    env.register_func("noop", |_| Ok(ScriptValue::Undefined));
    match env.run("ScriptIt.funcs.noop(() => 1)") {
        Err(ScriptError::Encoding(_)) => {}
        other => panic!("expected Encoding, got {:?}", other),
    }
}

#[test]
fn test_object_key_order_crosses_the_bridge() {
    for payload in [PayloadProfile::Text, PayloadProfile::Binary] {
        let config = SandboxConfig::default()
            .with_profile(Profile::Broad)
            .with_payload(payload);
        let mut env = ScriptingEnvironment::with_bridge(config, EchoBridge);
        env.register("echo", "echo");
        let val = env
            .eval_expression("Object.keys(ScriptIt.funcs.echo({zeta: 1, alpha: 2})[0]).join(',')")
            .unwrap();
        assert_eq!(val, ScriptValue::from("zeta,alpha"), "{}", payload);
    }
}
