use scriptit::{ScriptError, ScriptValue, ScriptingEnvironment};

#[test]
fn test_compile_error() {
    let mut env = ScriptingEnvironment::new();
    match env.eval_expression("import async return") {
        Err(ScriptError::Compile(_)) => {}
        other => panic!("expected Compile, got {:?}", other),
    }
}

#[test]
fn test_uncaught_throw_is_a_runtime_error() {
    let mut env = ScriptingEnvironment::new();
    match env.eval_expression("(() => { throw 'nope' })()") {
        Err(ScriptError::Runtime(msg)) => assert!(msg.contains("nope")),
        other => panic!("expected Runtime, got {:?}", other),
    }
}

#[test]
fn test_unknown_variable_is_undefined() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("unknown_variable").unwrap(), ScriptValue::Undefined);
}

#[test]
fn test_boolean_value() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("true").unwrap(), ScriptValue::Bool(true));
    assert_eq!(env.eval_expression("false").unwrap(), ScriptValue::Bool(false));
}

#[test]
fn test_string_value() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("`hello`").unwrap(), ScriptValue::from("hello"));
    assert_eq!(env.eval_expression("`hello ${'foo'}!`").unwrap(), ScriptValue::from("hello foo!"));
}

#[test]
fn test_number_value() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("123").unwrap(), ScriptValue::Number(123.0));
    assert_eq!(env.eval_expression("12 + 3 ").unwrap(), ScriptValue::Number(15.0));
}

#[test]
fn test_null_value() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("null").unwrap(), ScriptValue::Null);
}

#[test]
fn test_object_literal_expression() {
    let mut env = ScriptingEnvironment::new();
    let val = env.eval_expression("{ a: 1 }").unwrap();
    let ScriptValue::Object(map) = val else {
        panic!("expected object");
    };
    assert_eq!(map.get("a"), Some(&ScriptValue::Number(1.0)));
}

#[test]
fn test_compiled_unit_is_reusable() {
    let mut env = ScriptingEnvironment::new();
    let unit = env.compile("hits = (hits || 0) + 1").unwrap();
    env.run_compiled(&unit).unwrap();
    let val = env.run_compiled(&unit).unwrap();
    assert_eq!(val, ScriptValue::Number(2.0));
}

#[test]
fn test_deep_recursion_stays_on_a_default_thread_stack() {
    let outcome = std::thread::spawn(|| {
        let mut env = ScriptingEnvironment::new();
        let deep = env
            .eval_expression("function f(n) { if (n > 0) { return 1 + f(n - 1) } return 0 } f(200)")
            .map_err(|e| e.to_string());
        let runaway = env
            .eval_expression("function g(n) { return 1 + g(n + 1) } g(0)")
            .map_err(|e| e.to_string());
        (deep, runaway)
    })
    .join()
    .unwrap();

    assert_eq!(outcome.0, Ok(ScriptValue::Number(200.0)));
    let err = outcome.1.unwrap_err();
    assert!(err.contains("Maximum call stack size exceeded"), "{}", err);
}
