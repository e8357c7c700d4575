use std::cell::Cell;
use std::rc::Rc;

use scriptit::{ScriptError, ScriptValue, ScriptingEnvironment};

#[test]
fn test_count_fn() {
    let mut env = ScriptingEnvironment::new();
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    env.register_fn("count", move |_| {
        counter.set(counter.get() + 1);
        Ok(ScriptValue::Undefined)
    });

    env.run("count();count();").unwrap();
    assert_eq!(count.get(), 2);
}

#[test]
fn test_fn_is_a_container_global() {
    let mut env = ScriptingEnvironment::new();
    env.register_fn("add", |args| {
        let sum: f64 = args.iter().filter_map(ScriptValue::as_f64).sum();
        Ok(ScriptValue::Number(sum))
    });

    assert!(env.container_keys().contains(&"add".to_string()));
    assert_eq!(env.eval_expression("add(1, 2, 3)").unwrap(), ScriptValue::Number(6.0));
    assert_eq!(env.eval_expression("typeof ScriptIt.funcs.add").unwrap(), ScriptValue::from("undefined"));
}

#[test]
fn test_fn_state_survives_between_runs() {
    let mut env = ScriptingEnvironment::new();
    let mut seen = Vec::new();
    env.register_fn("next", move |args| {
        seen.extend_from_slice(args);
        Ok(ScriptValue::Number(seen.len() as f64))
    });

    env.run("next('a')").unwrap();
    assert_eq!(env.eval_expression("next('b', 'c')").unwrap(), ScriptValue::Number(3.0));
}

#[test]
fn test_fn_error_is_a_bridge_fault() {
    let mut env = ScriptingEnvironment::new();
    env.register_fn("fail", |_| Err(ScriptError::Runtime("no luck".to_string())));

    match env.run("fail()").unwrap_err() {
        ScriptError::BridgeFault { handler, message } => {
            assert_eq!(handler, "fail");
            assert!(message.contains("no luck"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let caught = env
        .eval_expression("(() => { try { fail() } catch (e) { return e.name } })()")
        .unwrap();
    assert_eq!(caught, ScriptValue::from("BridgeFault"));
}

#[test]
fn test_fn_rejects_function_arguments() {
    let mut env = ScriptingEnvironment::new();
    env.register_fn("take", |_| Ok(ScriptValue::Null));
    assert!(matches!(env.run("take(() => 1)").unwrap_err(), ScriptError::Encoding(_)));
}
