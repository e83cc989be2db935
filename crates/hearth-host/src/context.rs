use std::cell::RefCell;
use std::rc::Rc;

use hearth_runtime::Scope;
use tracing::debug;

use crate::error::{HostError, HostResult};
use crate::module::Module;
use crate::registry::WeakHost;

/// The isolated environment of one script.
///
/// Tracks which modules are installed in its scope and which are being
/// installed right now, so a module that requires itself through a chain of
/// other modules is reported instead of recursing forever.
pub struct ScriptContext {
    owner: String,
    scope: Scope,
    host: WeakHost,
    installed: RefCell<Vec<String>>,
    being_installed: RefCell<Vec<String>>,
}

impl ScriptContext {
    pub fn new(owner: impl Into<String>, scope: Scope, host: WeakHost) -> Self {
        Self {
            owner: owner.into(),
            scope,
            host,
            installed: RefCell::new(Vec::new()),
            being_installed: RefCell::new(Vec::new()),
        }
    }

    /// A context with no host behind it; `require` always fails
    pub fn detached(owner: impl Into<String>, scope: Scope) -> Self {
        Self::new(owner, scope, WeakHost::new())
    }

    /// Id of the script owning this context
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn host(&self) -> &WeakHost {
        &self.host
    }

    /// Installed module ids, in installation order
    pub fn installed_modules(&self) -> Vec<String> {
        self.installed.borrow().clone()
    }

    /// Modules whose installation is in progress, outermost first
    pub fn modules_being_installed(&self) -> Vec<String> {
        self.being_installed.borrow().clone()
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.installed.borrow().iter().any(|m| m == id)
    }

    /// Install module `id` into this context unless it already is
    pub fn require(&self, id: &str) -> HostResult<Rc<Module>> {
        let host = self.host.upgrade()?;
        let module = host.module(id).ok_or_else(|| HostError::NotFound { id: id.to_string() })?;

        if self.being_installed.borrow().iter().any(|m| m == id) {
            let mut chain = self.modules_being_installed();
            chain.push(id.to_string());
            return Err(HostError::CircularDependency {
                id: id.to_string(),
                chain,
            });
        }

        if self.is_installed(id) {
            return Ok(module);
        }

        self.being_installed.borrow_mut().push(id.to_string());
        let result = module.apply(self);
        self.being_installed.borrow_mut().retain(|m| m != id);

        result?;
        self.installed.borrow_mut().push(id.to_string());
        debug!(target: "scripting", "Installed module {} into {}", id, self.owner);
        Ok(module)
    }
}
