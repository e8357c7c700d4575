use scriptit::{AllowList, HandlerTable, Profile, SandboxConfig, ScriptValue, ScriptingEnvironment};

fn broad() -> ScriptingEnvironment {
    ScriptingEnvironment::with_config(SandboxConfig::default().with_profile(Profile::Broad))
}

#[test]
fn test_no_global_prototype_leakage() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("prototype").unwrap(), ScriptValue::Undefined);
}

#[test]
fn test_no_console() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("console").unwrap(), ScriptValue::Undefined);
    let mut env = broad();
    assert_eq!(env.eval_expression("typeof console").unwrap(), ScriptValue::from("undefined"));
}

#[test]
fn test_global_object_is_hidden() {
    for mut env in [ScriptingEnvironment::new(), broad()] {
        for name in ["globalThis", "global", "self", "window"] {
            assert_eq!(env.eval_expression(name).unwrap(), ScriptValue::Undefined, "{}", name);
        }
    }
}

#[test]
fn test_narrow_profile_exposes_only_core_names() {
    let mut env = ScriptingEnvironment::new();
    assert_eq!(env.eval_expression("Math.max(1, 4)").unwrap(), ScriptValue::Number(4.0));
    assert_eq!(env.eval_expression("typeof JSON").unwrap(), ScriptValue::from("undefined"));
    assert_eq!(env.eval_expression("typeof Date").unwrap(), ScriptValue::from("function"));
}

#[test]
fn test_broad_profile_exposes_json() {
    let mut env = broad();
    let val = env.eval_expression("JSON.stringify({a: [1, 2]})").unwrap();
    assert_eq!(val, ScriptValue::from(r#"{"a":[1,2]}"#));
}

#[test]
fn test_container_shadows_allowed_names() {
    let mut env = ScriptingEnvironment::new();
    env.run("Math = 'mine'").unwrap();
    assert_eq!(env.eval_expression("Math").unwrap(), ScriptValue::from("mine"));

    let mut fresh = ScriptingEnvironment::new();
    assert_eq!(fresh.eval_expression("typeof Math").unwrap(), ScriptValue::from("object"));
}

#[test]
fn test_environments_do_not_share_containers() {
    let mut first = ScriptingEnvironment::new();
    let mut second = ScriptingEnvironment::new();
    first.run("secret = 42").unwrap();
    assert_eq!(second.eval_expression("secret").unwrap(), ScriptValue::Undefined);
}

#[test]
fn test_custom_allow_list_exposes_only_its_names() {
    let list = AllowList::custom(Profile::Narrow, ["Math"]);
    let mut env = ScriptingEnvironment::with_allow_list(SandboxConfig::default(), list.into(), HandlerTable::new());

    assert_eq!(env.eval_expression("Math.max(1, 2)").unwrap(), ScriptValue::Number(2.0));
    assert_eq!(env.eval_expression("typeof fetch").unwrap(), ScriptValue::from("undefined"));
    for name in ["Date", "JSON", "Number"] {
        let kind = env.eval_expression(&format!("typeof {}", name)).unwrap();
        assert_eq!(kind, ScriptValue::from("undefined"), "{}", name);
    }
}
