/// The hearth script language
///
/// A small JavaScript-like language with a pest grammar and a tree-walking
/// interpreter. `ScriptEngine` implements the runtime `Evaluator` trait so a
/// host can compile, scan and run scripts without depending on the internals.
pub mod ast;
pub mod builtins;
pub mod engine;
pub mod interpreter;
pub mod parser;

pub use engine::{CompiledScript, ScriptEngine};
pub use parser::{MAX_NESTING_DEPTH, MAX_SYNTAX_DEPTH};
