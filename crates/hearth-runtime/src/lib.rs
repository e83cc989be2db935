/// Runtime contract shared between the hearth host and script languages
///
/// This crate provides the value model, binding scopes, syntax tree and the
/// `Evaluator` trait. Hosts depend on this crate to drive an evaluator without
/// knowing which language it implements; languages depend on it to expose
/// their programs to the host.
pub mod error;
pub mod evaluator;
pub mod scope;
pub mod syntax;
pub mod types;
pub mod value;

pub use error::{EvalError, StackFrame};
pub use evaluator::{Evaluator, Program};
pub use scope::{Binding, BindingKind, Scope};
pub use syntax::{SyntaxKind, SyntaxNode};
pub use types::{TypeDescriptor, TypeKind};
pub use value::{Callable, HostType, NativeFunction, Value};
