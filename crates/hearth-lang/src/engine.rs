use std::any::Any;
use std::rc::Rc;

use hearth_runtime::{
    EvalError, Evaluator, Program, Scope, SyntaxNode, TypeDescriptor, Value,
};
use tracing::debug;

use crate::ast::Script;
use crate::{builtins, interpreter, parser};

/// A parsed script ready to run in any scope
#[derive(Debug)]
pub struct CompiledScript {
    script: Script,
}

impl CompiledScript {
    pub fn script(&self) -> &Script {
        &self.script
    }
}

impl Program for CompiledScript {
    fn origin(&self) -> &str {
        &self.script.origin
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tree-walking evaluator for hearth scripts
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ScriptEngine {
    fn create_scope(&self) -> Scope {
        let scope = Scope::root();
        builtins::install(&scope);
        scope
    }

    fn parse(&self, source: &str, origin: &str) -> Result<SyntaxNode, EvalError> {
        parser::parse_syntax(source, origin)
    }

    fn compile(&self, source: &str, origin: &str) -> Result<Rc<dyn Program>, EvalError> {
        let script = parser::parse_script(source, origin)?;
        debug!(target: "scripting", "Compiled {} ({} statements)", origin, script.body.len());
        Ok(Rc::new(CompiledScript { script }))
    }

    fn eval(&self, program: &dyn Program, scope: &Scope) -> Result<Value, EvalError> {
        let compiled = program
            .as_any()
            .downcast_ref::<CompiledScript>()
            .ok_or_else(|| {
                EvalError::runtime(format!(
                    "{} was not compiled by this engine",
                    program.origin()
                ))
            })?;
        interpreter::run(&compiled.script, scope)
    }

    fn resolve_host_type(&self, descriptor: &TypeDescriptor) -> Result<Value, EvalError> {
        Ok(Value::host_type(descriptor.clone()))
    }
}
