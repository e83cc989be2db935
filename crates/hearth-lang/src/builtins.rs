use hearth_runtime::{EvalError, NativeFunction, Scope, Value};

/// Install the language builtins into a root scope
pub fn install(scope: &Scope) {
    scope.declare_builtin("len", NativeFunction::new("len", len).into_value());
    scope.declare_builtin("keys", NativeFunction::new("keys", keys).into_value());
    scope.declare_builtin("push", NativeFunction::new("push", push).into_value());
    scope.declare_builtin("str", NativeFunction::new("str", str).into_value());
}

fn first(args: &[Value], function: &str) -> Result<Value, EvalError> {
    args.first()
        .cloned()
        .ok_or_else(|| EvalError::runtime(format!("{}() expects an argument", function)))
}

fn len(args: Vec<Value>) -> Result<Value, EvalError> {
    let count = match first(&args, "len")? {
        Value::Array(items) => items.borrow().len(),
        Value::Object(map) => map.borrow().len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return Err(EvalError::runtime(format!(
                "len() not supported for {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Number(count as f64))
}

fn keys(args: Vec<Value>) -> Result<Value, EvalError> {
    match first(&args, "keys")? {
        Value::Object(map) => Ok(Value::array(
            map.borrow().keys().map(Value::str).collect(),
        )),
        other => Err(EvalError::runtime(format!(
            "keys() expects an object, got {}",
            other.type_name()
        ))),
    }
}

fn push(args: Vec<Value>) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    match args.next() {
        Some(Value::Array(items)) => {
            let mut items = items.borrow_mut();
            items.extend(args);
            Ok(Value::Number(items.len() as f64))
        }
        _ => Err(EvalError::runtime("push() expects an array")),
    }
}

fn str(args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::str(
        args.first().map(ToString::to_string).unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_len_and_push() {
        let items = Value::array(vec![Value::Number(1.0)]);
        assert_eq!(
            push(vec![items.clone(), Value::Number(2.0), Value::Number(3.0)]).unwrap(),
            Value::Number(3.0)
        );
        assert_eq!(len(vec![items]).unwrap(), Value::Number(3.0));
        assert_eq!(len(vec![Value::str("héllo")]).unwrap(), Value::Number(5.0));
        assert!(len(vec![Value::Null]).is_err());
        assert!(len(vec![]).is_err());
    }

    #[test]
    fn test_keys_sorted() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), Value::Null);
        map.insert("a".to_string(), Value::Null);
        let result = keys(vec![Value::object(map)]).unwrap();
        assert_eq!(result.to_string(), "[a, b]");
    }

    #[test]
    fn test_str() {
        assert_eq!(str(vec![Value::Number(4.0)]).unwrap(), Value::str("4"));
        assert_eq!(str(vec![]).unwrap(), Value::str(""));
    }
}
