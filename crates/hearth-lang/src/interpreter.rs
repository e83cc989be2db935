use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use hearth_runtime::value::format_number;
use hearth_runtime::{Callable, EvalError, NativeFunction, Scope, StackFrame, Value};

use crate::ast::*;

/// Nested script calls allowed before evaluation is aborted
pub const MAX_CALL_DEPTH: usize = 128;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, EvalError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(EvalError::runtime("maximum call depth exceeded"));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

enum Flow {
    Normal(Value),
    Return(Value),
}

/// Run a parsed script directly in `scope`
pub fn run(script: &Script, scope: &Scope) -> Result<Value, EvalError> {
    let mut activation = Activation::new("<top>", &script.origin);
    match activation.exec_body(&script.body, scope) {
        Ok(Flow::Normal(value)) | Ok(Flow::Return(value)) => Ok(value),
        Err(err) => Err(activation.locate(err)),
    }
}

/// A script function together with the scope it closes over
pub struct Closure {
    def: Rc<FunctionDef>,
    scope: Scope,
    origin: Rc<str>,
}

impl Callable for Closure {
    fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or("<anonymous>")
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let _depth = DepthGuard::enter()?;
        let scope = self.scope.child();
        let mut args = args.into_iter();
        for param in &self.def.params {
            scope.declare(param.clone(), args.next().unwrap_or_default(), true);
        }

        let mut activation = Activation::new(self.name(), &self.origin);
        match activation.exec_body(&self.def.body, &scope) {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal(_)) => Ok(Value::Null),
            Err(err) => Err(activation.locate(err)),
        }
    }
}

/// One running function body
struct Activation<'a> {
    function: &'a str,
    origin: &'a Rc<str>,
    /// Line of the innermost statement that failed in this activation
    fault_line: Option<usize>,
}

impl<'a> Activation<'a> {
    fn new(function: &'a str, origin: &'a Rc<str>) -> Self {
        Self {
            function,
            origin,
            fault_line: None,
        }
    }

    fn locate(&mut self, err: EvalError) -> EvalError {
        match self.fault_line.take() {
            Some(line) => err.with_frame(StackFrame {
                function: self.function.to_string(),
                origin: self.origin.to_string(),
                line,
            }),
            None => err,
        }
    }

    fn closure(&self, def: &Rc<FunctionDef>, scope: &Scope) -> Value {
        Value::Function(Rc::new(Closure {
            def: Rc::clone(def),
            scope: scope.clone(),
            origin: Rc::clone(self.origin),
        }))
    }

    fn exec_body(&mut self, body: &[Stmt], scope: &Scope) -> Result<Flow, EvalError> {
        // Function declarations are visible to the whole block
        for stmt in body {
            if let StmtKind::Function(def) = &stmt.kind {
                if let Some(name) = &def.name {
                    scope.declare(name.clone(), self.closure(def, scope), true);
                }
            }
        }

        let mut completion = Value::Null;
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(value) => completion = value,
            }
        }
        Ok(Flow::Normal(completion))
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Scope) -> Result<Flow, EvalError> {
        let result = self.exec_kind(&stmt.kind, scope);
        if result.is_err() && self.fault_line.is_none() {
            self.fault_line = Some(stmt.line);
        }
        result
    }

    fn exec_kind(&mut self, kind: &StmtKind, scope: &Scope) -> Result<Flow, EvalError> {
        match kind {
            StmtKind::Empty | StmtKind::Function(_) => Ok(Flow::Normal(Value::Null)),
            StmtKind::Expression(expr) => Ok(Flow::Normal(self.eval(expr, scope)?)),
            StmtKind::Declaration { kind, declarators } => {
                for (name, init) in declarators {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Null,
                    };
                    scope.declare(name.clone(), value, kind.is_mutable());
                }
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, scope)?.is_truthy() {
                    self.exec(then_branch, scope)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch, scope)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            StmtKind::While { condition, body } => {
                while self.eval(condition, scope)?.is_truthy() {
                    if let Flow::Return(value) = self.exec(body, scope)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Block(body) => self.exec_body(body, &scope.child()),
        }
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Rc::clone(s))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Identifier(name) => scope
                .get(name)
                .ok_or_else(|| EvalError::runtime(format!("{} is not defined", name))),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::array(values))
            }
            Expr::Object(properties) => {
                let mut map = BTreeMap::new();
                for (key, value) in properties {
                    map.insert(key.clone(), self.eval(value, scope)?);
                }
                Ok(Value::object(map))
            }
            Expr::Function(def) => Ok(self.closure(def, scope)),
            Expr::Member { object, property } => {
                let object = self.eval(object, scope)?;
                get_member(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                get_index(&object, &index)
            }
            Expr::Call { callee, args } => {
                let func = self.eval(callee, scope)?;
                let Value::Function(func) = func else {
                    return Err(EvalError::runtime(format!(
                        "{} is not a function",
                        callee.describe()
                    )));
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?);
                }
                func.call(values)
            }
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf {
                    if let Expr::Identifier(name) = operand.as_ref() {
                        if scope.get(name).is_none() {
                            return Ok(Value::str("undefined"));
                        }
                    }
                }
                let value = self.eval(operand, scope)?;
                unary(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            }
            Expr::Assign { op, target, value } => {
                let mut value = self.eval(value, scope)?;
                if *op != AssignOp::Assign {
                    let current = self.eval(target, scope)?;
                    let arith = match op {
                        AssignOp::SubtractAssign => BinaryOp::Subtract,
                        _ => BinaryOp::Add,
                    };
                    value = binary(arith, &current, &value)?;
                }
                self.assign(target, value.clone(), scope)?;
                Ok(value)
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &Scope) -> Result<(), EvalError> {
        match target {
            Expr::Identifier(name) => scope.assign(name, value),
            Expr::Member { object, property } => match self.eval(object, scope)? {
                Value::Object(map) => {
                    map.borrow_mut().insert(property.clone(), value);
                    Ok(())
                }
                other => Err(EvalError::runtime(format!(
                    "cannot set property '{}' of {}",
                    property,
                    other.type_name()
                ))),
            },
            Expr::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                set_index(&object, &index, value)
            }
            other => Err(EvalError::runtime(format!(
                "invalid assignment target: {}",
                other.describe()
            ))),
        }
    }
}

fn get_member(object: &Value, property: &str) -> Result<Value, EvalError> {
    Ok(match object {
        Value::Null => {
            return Err(EvalError::runtime(format!(
                "cannot read property '{}' of null",
                property
            )))
        }
        Value::Object(map) => map.borrow().get(property).cloned().unwrap_or_default(),
        Value::HostType(ty) => ty.member(property).unwrap_or_default(),
        Value::Array(items) => match property {
            "length" => Value::Number(items.borrow().len() as f64),
            "push" => {
                let items = Rc::clone(items);
                NativeFunction::new("push", move |args| {
                    let mut items = items.borrow_mut();
                    items.extend(args);
                    Ok(Value::Number(items.len() as f64))
                })
                .into_value()
            }
            _ => Value::Null,
        },
        Value::Str(s) if property == "length" => Value::Number(s.chars().count() as f64),
        _ => Value::Null,
    })
}

fn array_slot(index: &Value) -> Option<usize> {
    match index {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        _ => None,
    }
}

fn object_key(index: &Value) -> Option<String> {
    match index {
        Value::Str(s) => Some(s.to_string()),
        Value::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

fn get_index(object: &Value, index: &Value) -> Result<Value, EvalError> {
    Ok(match object {
        Value::Null => return Err(EvalError::runtime("cannot index null")),
        Value::Array(items) => array_slot(index)
            .and_then(|slot| items.borrow().get(slot).cloned())
            .unwrap_or_default(),
        Value::Object(map) => object_key(index)
            .and_then(|key| map.borrow().get(&key).cloned())
            .unwrap_or_default(),
        Value::Str(s) => array_slot(index)
            .and_then(|slot| s.chars().nth(slot))
            .map(|c| Value::str(c.to_string()))
            .unwrap_or_default(),
        _ => Value::Null,
    })
}

fn set_index(object: &Value, index: &Value, value: Value) -> Result<(), EvalError> {
    match object {
        Value::Array(items) => {
            let slot = array_slot(index).ok_or_else(|| {
                EvalError::runtime(format!("invalid array index {}", index))
            })?;
            let mut items = items.borrow_mut();
            if slot < items.len() {
                items[slot] = value;
            } else if slot == items.len() {
                items.push(value);
            } else {
                return Err(EvalError::runtime(format!(
                    "array index {} out of range",
                    slot
                )));
            }
            Ok(())
        }
        Value::Object(map) => {
            let key = object_key(index)
                .ok_or_else(|| EvalError::runtime(format!("invalid object key {}", index)))?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(EvalError::runtime(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::TypeOf => Ok(Value::str(value.type_name())),
        UnaryOp::Negate => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::runtime(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    match op {
        Equal => return Ok(Value::Bool(left == right)),
        NotEqual => return Ok(Value::Bool(left != right)),
        Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                return Ok(Value::str(format!("{}{}", left, right)));
            }
        }
        _ => {}
    }

    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return match op {
            Less => Ok(Value::Bool(a < b)),
            LessEqual => Ok(Value::Bool(a <= b)),
            Greater => Ok(Value::Bool(a > b)),
            GreaterEqual => Ok(Value::Bool(a >= b)),
            _ => Err(operand_error(op, left, right)),
        };
    }

    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return Err(operand_error(op, left, right));
    };
    let (a, b) = (*a, *b);
    Ok(match op {
        Add => Value::Number(a + b),
        Subtract => Value::Number(a - b),
        Multiply => Value::Number(a * b),
        Divide => Value::Number(a / b),
        Remainder => Value::Number(a % b),
        Less => Value::Bool(a < b),
        LessEqual => Value::Bool(a <= b),
        Greater => Value::Bool(a > b),
        GreaterEqual => Value::Bool(a >= b),
        Equal => Value::Bool(a == b),
        NotEqual => Value::Bool(a != b),
    })
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::runtime(format!(
        "unsupported operands for {:?}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}
