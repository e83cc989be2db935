use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::EvalError;
use crate::types::TypeDescriptor;

/// Anything a script can call
pub trait Callable {
    fn name(&self) -> &str;

    fn call(&self, args: Vec<Value>) -> Result<Value, EvalError>;
}

type NativeFn = dyn Fn(Vec<Value>) -> Result<Value, EvalError>;

/// A function implemented by the host
pub struct NativeFunction {
    name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Function(Rc::new(self))
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        (self.func)(args)
    }
}

/// A live reference to a host type, as bound into a scope by the importer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostType {
    descriptor: TypeDescriptor,
}

impl HostType {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Static members visible to scripts
    pub fn member(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::str(&self.descriptor.simple_name)),
            "qualifiedName" => Some(Value::str(&self.descriptor.qualified_name)),
            "kind" => Some(Value::str(self.descriptor.kind.to_string())),
            _ => None,
        }
    }
}

/// Tagged script value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Rc<dyn Callable>),
    HostType(Rc<HostType>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn host_type(descriptor: TypeDescriptor) -> Self {
        Value::HostType(Rc::new(HostType::new(descriptor)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::HostType(_) => "type",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_host_type(&self) -> Option<&TypeDescriptor> {
        match self {
            Value::HostType(ty) => Some(ty.descriptor()),
            _ => None,
        }
    }

    /// Read a property of an object value
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned(),
            Value::HostType(ty) => ty.member(key),
            _ => None,
        }
    }

    /// Convert to JSON; `None` for values with no document form (functions, types)
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .filter_map(Value::to_json)
                    .collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
                    .collect(),
            ),
            Value::Function(_) | Value::HostType(_) => return None,
        })
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    // Whole numbers go back out as integers so documents survive a round trip
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            (Value::HostType(a), Value::HostType(b)) => a.descriptor() == b.descriptor(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "function {}()", func.name()),
            Value::HostType(ty) => write!(f, "[type {}]", ty.descriptor().qualified_name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_reference_values_compare_by_identity() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::str("x"), Value::str("x"));
    }

    #[test]
    fn test_json_keeps_integers_and_drops_functions() {
        let mut map = BTreeMap::new();
        map.insert("count".to_string(), Value::Number(3.0));
        map.insert("ratio".to_string(), Value::Number(0.5));
        map.insert(
            "callback".to_string(),
            NativeFunction::new("noop", |_| Ok(Value::Null)).into_value(),
        );
        let json = Value::object(map).to_json().unwrap();

        assert_eq!(json, serde_json::json!({"count": 3, "ratio": 0.5}));
    }

    #[test]
    fn test_json_into_values() {
        let json = serde_json::json!({"name": "hearth", "tags": ["a", "b"], "on": true});
        let value = Value::from_json(&json);

        assert_eq!(value.get("name"), Some(Value::str("hearth")));
        assert_eq!(value.get("on"), Some(Value::Bool(true)));
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::str("a")]).to_string(),
            "[1, a]"
        );
        let ty = Value::host_type(TypeDescriptor::class("org.example.Player"));
        assert_eq!(ty.to_string(), "[type org.example.Player]");
        assert_eq!(ty.get("name"), Some(Value::str("Player")));
    }
}
