//! Selective import of host types into unit scopes

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use hearth_runtime::{Evaluator, TypeDescriptor};
use tracing::{debug, warn};

use crate::capabilities::HostTypes;
use crate::context::ScriptContext;
use crate::error::{HostError, HostResult};
use crate::scanner::scan_identifiers;

/// Host types by simple name
pub type TypeRegistry = HashMap<String, TypeDescriptor>;

/// Binds the host types a unit refers to into the unit's context.
///
/// Building the type registry enumerates the whole host API, so it can be
/// cached while many units load back to back.
pub struct Importer {
    evaluator: Rc<dyn Evaluator>,
    types: Rc<dyn HostTypes>,
    root_namespace: String,
    caching: Cell<bool>,
    cache: RefCell<Option<Rc<TypeRegistry>>>,
}

impl Importer {
    pub fn new(
        evaluator: Rc<dyn Evaluator>,
        types: Rc<dyn HostTypes>,
        root_namespace: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            types,
            root_namespace: root_namespace.into(),
            caching: Cell::new(false),
            cache: RefCell::new(None),
        }
    }

    pub fn root_namespace(&self) -> &str {
        &self.root_namespace
    }

    pub fn is_caching(&self) -> bool {
        self.caching.get()
    }

    /// Turning caching off drops the cached registry right away
    pub fn set_caching(&self, caching: bool) {
        self.caching.set(caching);
        if !caching {
            self.cache.borrow_mut().take();
        }
    }

    /// Cache the registry until the returned guard is dropped
    pub fn bulk(&self) -> BulkImport<'_> {
        let previous = self.is_caching();
        self.set_caching(true);
        BulkImport {
            importer: self,
            previous,
        }
    }

    /// The current type registry, rebuilt unless a cached one is valid
    pub fn types(&self) -> Rc<TypeRegistry> {
        if self.is_caching() {
            if let Some(cached) = self.cache.borrow().as_ref() {
                return Rc::clone(cached);
            }
        }

        let registry = Rc::new(self.build_registry());
        if self.is_caching() {
            *self.cache.borrow_mut() = Some(Rc::clone(&registry));
        }
        registry
    }

    pub fn lookup(&self, simple_name: &str) -> Option<TypeDescriptor> {
        self.types().get(simple_name).cloned()
    }

    fn build_registry(&self) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        for descriptor in self.types.list_public_types(&self.root_namespace) {
            if !descriptor.in_namespace(&self.root_namespace) {
                continue;
            }
            match registry.get(&descriptor.simple_name) {
                Some(existing) => {
                    warn!(
                        target: "scripting",
                        "Type name collision: {} hides {}",
                        existing.qualified_name,
                        descriptor.qualified_name
                    );
                }
                None => {
                    registry.insert(descriptor.simple_name.clone(), descriptor);
                }
            }
        }
        debug!(target: "scripting", "Built type registry with {} types", registry.len());
        registry
    }

    /// Bind every host type `source` refers to into the context's scope.
    /// Returns the number of bindings made.
    pub fn import_into(
        &self,
        context: &ScriptContext,
        source: &str,
        origin: &str,
    ) -> HostResult<usize> {
        let identifiers = scan_identifiers(self.evaluator.as_ref(), source, origin)
            .map_err(|e| HostError::eval(origin, e))?;
        let registry = self.types();

        let mut bound = 0;
        for name in identifiers
            .iter()
            .filter(|name| name.starts_with(|c: char| c.is_uppercase()))
        {
            let Some(descriptor) = registry.get(name) else {
                continue;
            };
            match self.evaluator.resolve_host_type(descriptor) {
                Ok(value) => {
                    if context.scope().bind_host_type(name.as_str(), value) {
                        bound += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        target: "scripting",
                        "Failed to resolve {} for {}: {}",
                        descriptor.qualified_name,
                        origin,
                        e
                    );
                }
            }
        }

        debug!(target: "scripting", "Imported {} host types into {} for {}", bound, context.owner(), origin);
        Ok(bound)
    }
}

/// Restores the previous caching flag on drop
pub struct BulkImport<'a> {
    importer: &'a Importer,
    previous: bool,
}

impl Drop for BulkImport<'_> {
    fn drop(&mut self) {
        self.importer.set_caching(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticTypes;
    use hearth_lang::ScriptEngine;
    use hearth_runtime::{BindingKind, Value};

    /// Counts how often the host enumerates its types
    struct CountingTypes {
        inner: StaticTypes,
        calls: Cell<usize>,
    }

    impl HostTypes for CountingTypes {
        fn list_public_types(&self, root_namespace: &str) -> Vec<TypeDescriptor> {
            self.calls.set(self.calls.get() + 1);
            self.inner.list_public_types(root_namespace)
        }
    }

    fn importer() -> (Importer, Rc<CountingTypes>) {
        let types = Rc::new(CountingTypes {
            inner: StaticTypes::new(vec![
                TypeDescriptor::class("org.example.Player"),
                TypeDescriptor::class("org.example.world.Location"),
                TypeDescriptor::class("org.example.other.Player"),
                TypeDescriptor::event("org.example.event.JoinEvent"),
            ]),
            calls: Cell::new(0),
        });
        let importer = Importer::new(Rc::new(ScriptEngine::new()), types.clone(), "org.example");
        (importer, types)
    }

    fn context() -> ScriptContext {
        ScriptContext::detached("test", ScriptEngine::new().create_scope())
    }

    #[test]
    fn test_imports_only_referenced_capitalized_names() {
        let (importer, _) = importer();
        let ctx = context();
        let bound = importer
            .import_into(&ctx, "Player.teleport(player, Location)", "a.js")
            .unwrap();

        assert_eq!(bound, 2);
        let player = ctx.scope().binding("Player").unwrap();
        assert_eq!(player.kind, BindingKind::HostType);
        assert!(ctx.scope().get("Location").is_some());
        assert!(ctx.scope().get("player").is_none());
        assert!(ctx.scope().get("JoinEvent").is_none());
    }

    #[test]
    fn test_first_seen_wins_on_collision() {
        let (importer, _) = importer();
        let player = importer.lookup("Player").unwrap();
        assert_eq!(player.qualified_name, "org.example.Player");
    }

    #[test]
    fn test_declared_binding_wins() {
        let (importer, _) = importer();
        let ctx = context();
        ctx.scope().declare("Player", Value::from(1.0), false);

        let bound = importer.import_into(&ctx, "Player", "a.js").unwrap();
        assert_eq!(bound, 0);
        assert_eq!(ctx.scope().get("Player"), Some(Value::from(1.0)));
    }

    #[test]
    fn test_caching_and_invalidation() {
        let (importer, types) = importer();
        importer.types();
        importer.types();
        assert_eq!(types.calls.get(), 2);

        {
            let _bulk = importer.bulk();
            importer.types();
            importer.types();
            assert_eq!(types.calls.get(), 3);
        }
        assert!(!importer.is_caching());

        importer.types();
        assert_eq!(types.calls.get(), 4);

        importer.set_caching(true);
        importer.types();
        importer.types();
        assert_eq!(types.calls.get(), 5);
        importer.set_caching(false);
        importer.set_caching(true);
        importer.types();
        assert_eq!(types.calls.get(), 6);
    }
}
