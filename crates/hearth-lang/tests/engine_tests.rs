use hearth_lang::ScriptEngine;
use hearth_runtime::{EvalError, Evaluator, NativeFunction, TypeDescriptor, Value};

fn run(source: &str) -> Result<Value, EvalError> {
    let engine = ScriptEngine::new();
    let program = engine.compile(source, "test.js")?;
    let scope = engine.create_scope();
    engine.eval(program.as_ref(), &scope)
}

#[test]
fn test_arithmetic_and_strings() {
    assert_eq!(run("1 + 2 * 3 - 4 / 2").unwrap(), Value::Number(5.0));
    assert_eq!(run("7 % 4").unwrap(), Value::Number(3.0));
    assert_eq!(run("'n=' + 3").unwrap(), Value::str("n=3"));
    assert_eq!(run("-(2 + 3)").unwrap(), Value::Number(-5.0));
    assert_eq!(run("'a' < 'b' && 2 >= 2").unwrap(), Value::Bool(true));
}

#[test]
fn test_logical_operators_return_operands() {
    assert_eq!(run("null || 'fallback'").unwrap(), Value::str("fallback"));
    assert_eq!(run("0 && missing()").unwrap(), Value::Number(0.0));
}

#[test]
fn test_functions_are_hoisted() {
    let source = r#"
        let result = double(21);
        function double(x) { return x * 2 }
        result
    "#;
    assert_eq!(run(source).unwrap(), Value::Number(42.0));
}

#[test]
fn test_closures_capture_their_scope() {
    let source = r#"
        function counter() {
            let n = 0;
            return function () { n += 1; return n };
        }
        const next = counter();
        next(); next();
        next()
    "#;
    assert_eq!(run(source).unwrap(), Value::Number(3.0));
}

#[test]
fn test_while_and_arrays() {
    let source = r#"
        let items = [];
        let i = 0;
        while (i < 5) {
            items.push(i * i);
            i = i + 1;
        }
        items[2] = 40;
        push(items, 99);
        len(items) + items[2] + items.length
    "#;
    assert_eq!(run(source).unwrap(), Value::Number(6.0 + 40.0 + 6.0));
}

#[test]
fn test_objects() {
    let source = r#"
        const config = { name: "hearth", 'quoted key': 1 };
        config.count = 2;
        config["other"] = 3;
        str(keys(config)) + ":" + config.name
    "#;
    assert_eq!(
        run(source).unwrap(),
        Value::str("[count, name, other, quoted key]:hearth")
    );
}

#[test]
fn test_typeof() {
    assert_eq!(run("typeof nothingHere").unwrap(), Value::str("undefined"));
    assert_eq!(run("typeof len").unwrap(), Value::str("function"));
    assert_eq!(run("typeof {}").unwrap(), Value::str("object"));
}

#[test]
fn test_const_and_undeclared_assignment_fail() {
    let err = run("const x = 1; x = 2").unwrap_err();
    assert!(err.to_string().contains("constant"), "{}", err);

    let err = run("y = 2").unwrap_err();
    assert_eq!(err.to_string(), "y is not defined");
}

#[test]
fn test_runtime_error_stack() {
    let source = "function inner() {\n  return missing + 1\n}\nfunction outer() {\n  return inner()\n}\nouter()\n";
    let err = run(source).unwrap_err();
    let frames: Vec<(String, usize)> = err
        .stack()
        .iter()
        .map(|frame| (frame.function.clone(), frame.line))
        .collect();

    assert_eq!(
        frames,
        vec![
            ("inner".to_string(), 2),
            ("outer".to_string(), 5),
            ("<top>".to_string(), 7)
        ]
    );
    assert!(err.script_stack().contains("at inner (test.js:2)"));
}

#[test]
fn test_call_depth_is_bounded() {
    let err = run("function f() { return f() }\nf()").unwrap_err();
    assert!(err.to_string().contains("maximum call depth"));
}

#[test]
fn test_program_reused_across_scopes() {
    let engine = ScriptEngine::new();
    let program = engine.compile("let seen = marker; seen", "shared.js").unwrap();

    let first = engine.create_scope();
    first.declare("marker", Value::str("one"), false);
    let second = engine.create_scope();
    second.declare("marker", Value::str("two"), false);

    assert_eq!(engine.eval(program.as_ref(), &first).unwrap(), Value::str("one"));
    assert_eq!(engine.eval(program.as_ref(), &second).unwrap(), Value::str("two"));
    assert_eq!(first.get("seen"), Some(Value::str("one")));
    assert_eq!(second.get("seen"), Some(Value::str("two")));
}

#[test]
fn test_native_functions_and_host_types() {
    let engine = ScriptEngine::new();
    let scope = engine.create_scope();
    scope.declare_builtin(
        "twice",
        NativeFunction::new("twice", |args| {
            let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        })
        .into_value(),
    );
    let player = engine
        .resolve_host_type(&TypeDescriptor::class("org.example.Player"))
        .unwrap();
    scope.bind_host_type("Player", player);

    let program = engine
        .compile("twice(4) + ':' + Player.name + ':' + Player.qualifiedName", "n.js")
        .unwrap();
    assert_eq!(
        engine.eval(program.as_ref(), &scope).unwrap(),
        Value::str("8:Player:org.example.Player")
    );
}

#[test]
fn test_invoke_calls_script_functions() {
    let engine = ScriptEngine::new();
    let scope = engine.create_scope();
    let program = engine
        .compile("function greet(who) { return 'hi ' + who }", "i.js")
        .unwrap();
    engine.eval(program.as_ref(), &scope).unwrap();

    let greet = scope.get("greet").unwrap();
    assert_eq!(
        engine.invoke(&greet, vec![Value::str("there")]).unwrap(),
        Value::str("hi there")
    );
    assert!(engine.invoke(&Value::Number(1.0), vec![]).is_err());
}

#[test]
fn test_parse_errors_are_syntax_errors() {
    let engine = ScriptEngine::new();
    let err = engine.compile("function (", "bad.js").unwrap_err();
    assert!(err.is_syntax());
    assert!(err.to_string().starts_with("bad.js:1:"));
}

#[test]
fn test_nested_brackets_parse_in_linear_time() {
    let depth = hearth_lang::MAX_NESTING_DEPTH;
    let started = std::time::Instant::now();

    let parens = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(run(&parens).unwrap(), Value::Number(1.0));

    let calls = format!(
        "function id(x) {{ return x }}\n{}2{}",
        "id(".repeat(depth),
        ")".repeat(depth)
    );
    assert_eq!(run(&calls).unwrap(), Value::Number(2.0));

    let levels = depth / 2 - 1;
    let callbacks = format!(
        "function call(f) {{ return f() }}\n{}7{}",
        "call(function () { return ".repeat(levels),
        " })".repeat(levels)
    );
    assert_eq!(run(&callbacks).unwrap(), Value::Number(7.0));

    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn test_excessive_nesting_is_a_syntax_error() {
    let engine = ScriptEngine::new();
    let sources = [
        format!("var x = {}1{}", "(".repeat(10_000), ")".repeat(10_000)),
        format!("f{}", "(f".repeat(10_000)),
        format!("var x = {}1", "1 + ".repeat(10_000)),
        format!("var x; {}1", "x = ".repeat(10_000)),
        format!("{}true", "!".repeat(10_000)),
        format!("var o = {{}}; o{}", ".a".repeat(10_000)),
    ];
    for source in &sources {
        let err = engine.compile(source, "deep.js").unwrap_err();
        assert!(err.is_syntax(), "expected syntax error, got {}", err);
        assert!(err.to_string().contains("nested deeper than"), "{}", err);
    }
}

#[test]
fn test_brackets_in_strings_and_comments_do_not_count() {
    let open = "(".repeat(200);
    let source = format!(
        "// {open}\n/* {open} */\nvar s = '{open}' + \"{open}\";\nlen(s)",
        open = open
    );
    assert_eq!(run(&source).unwrap(), Value::Number(400.0));
}

#[test]
fn test_assignment_chains_and_targets() {
    assert_eq!(
        run("let a; let b; a = b = 4; a + b").unwrap(),
        Value::Number(8.0)
    );
    assert_eq!(
        run("let o = {}; o.x = o.y = 2; o.x += 1; o.x * 10 + o.y").unwrap(),
        Value::Number(32.0)
    );
    assert_eq!(
        run("let xs = [0]; xs[0] -= 5; xs[0]").unwrap(),
        Value::Number(-5.0)
    );

    let engine = ScriptEngine::new();
    for source in ["1 = 2", "f() = 3", "let a; let b; a + b = 1", "(a) += 1 = 2"] {
        let err = engine.compile(source, "assign.js").unwrap_err();
        assert!(err.is_syntax(), "{} should not compile", source);
    }
}

#[test]
fn test_else_if_chains() {
    let source = r#"
        function grade(n) {
            if (n > 90) return 'a';
            else if (n > 80) return 'b';
            else if (n > 70) { return 'c' }
            else return 'f';
        }
        grade(95) + grade(85) + grade(75) + grade(10)
    "#;
    assert_eq!(run(source).unwrap(), Value::str("abcf"));

    let mut long_chain = String::from("var n = 75; var hit = -1;\nif (n == 0) hit = 0;");
    for i in 1..100 {
        long_chain.push_str(&format!("\nelse if (n == {}) hit = {};", i, i));
    }
    long_chain.push_str("\nhit");
    assert_eq!(run(&long_chain).unwrap(), Value::Number(75.0));
}
