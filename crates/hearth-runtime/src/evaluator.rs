use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::EvalError;
use crate::scope::Scope;
use crate::syntax::SyntaxNode;
use crate::types::TypeDescriptor;
use crate::value::Value;

/// A compiled unit of program text, reusable across scopes
pub trait Program: Debug {
    /// Origin label given at compile time, usually the file name
    fn origin(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// A scripting language the host can drive.
///
/// Implementations are used from a single control thread. `eval` and `invoke`
/// may re-enter the host through native functions bound in the scope, so an
/// implementation must not hold interior borrows across those calls.
pub trait Evaluator {
    /// Create a fresh root scope with the language's builtins installed
    fn create_scope(&self) -> Scope;

    /// Parse program text into a generic syntax tree
    fn parse(&self, source: &str, origin: &str) -> Result<SyntaxNode, EvalError>;

    fn compile(&self, source: &str, origin: &str) -> Result<Rc<dyn Program>, EvalError>;

    /// Run a compiled program in `scope`. Top-level declarations land in `scope` itself.
    fn eval(&self, program: &dyn Program, scope: &Scope) -> Result<Value, EvalError>;

    /// Produce the script-visible value for a host type
    fn resolve_host_type(&self, descriptor: &TypeDescriptor) -> Result<Value, EvalError>;

    /// Call a callable value
    fn invoke(&self, callee: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match callee {
            Value::Function(func) => func.call(args),
            other => Err(EvalError::runtime(format!(
                "{} is not a function",
                other.type_name()
            ))),
        }
    }
}
