use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::EvalError;
use crate::value::Value;

/// Where a binding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Installed by the evaluator or host before any unit code ran
    Builtin,
    /// Bound by the importer for a referenced host type
    HostType,
    /// Declared by unit code
    Declared,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub kind: BindingKind,
    pub mutable: bool,
}

struct Frame {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Scope>,
}

/// A chain of name bindings. Cloning shares the underlying frame.
#[derive(Clone)]
pub struct Scope(Rc<Frame>);

impl Scope {
    pub fn root() -> Self {
        Scope(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    /// Declare `name` in this frame, replacing whatever was bound here before
    pub fn declare(&self, name: impl Into<String>, value: Value, mutable: bool) {
        self.insert(name.into(), value, BindingKind::Declared, mutable);
    }

    pub fn declare_builtin(&self, name: impl Into<String>, value: Value) {
        self.insert(name.into(), value, BindingKind::Builtin, false);
    }

    /// Bind a host type unless unit code already declared the name here.
    /// Returns whether the binding was made.
    pub fn bind_host_type(&self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        let mut bindings = self.0.bindings.borrow_mut();
        if let Some(existing) = bindings.get(&name) {
            if existing.kind == BindingKind::Declared {
                return false;
            }
        }
        bindings.insert(
            name,
            Binding {
                value,
                kind: BindingKind::HostType,
                mutable: false,
            },
        );
        true
    }

    fn insert(&self, name: String, value: Value, kind: BindingKind, mutable: bool) {
        self.0.bindings.borrow_mut().insert(
            name,
            Binding {
                value,
                kind,
                mutable,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.binding(name).map(|binding| binding.value)
    }

    pub fn binding(&self, name: &str) -> Option<Binding> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.0.bindings.borrow().get(name) {
                return Some(binding.clone());
            }
            scope = current.parent();
        }
        None
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    /// Rebind an existing name in the nearest frame that holds it
    pub fn assign(&self, name: &str, value: Value) -> Result<(), EvalError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.0.bindings.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(EvalError::runtime(format!(
                        "assignment to constant '{}'",
                        name
                    )));
                }
                binding.value = value;
                return Ok(());
            }
            scope = current.parent();
        }
        Err(EvalError::runtime(format!("{} is not defined", name)))
    }

    /// Bindings of this frame only, sorted by name
    pub fn local_entries(&self) -> Vec<(String, Binding)> {
        let mut entries: Vec<_> = self
            .0
            .bindings
            .borrow()
            .iter()
            .map(|(name, binding)| (name.clone(), binding.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drop every binding of this frame. Breaks closure cycles through the frame.
    pub fn clear(&self) {
        let drained: Vec<Binding> = self
            .0
            .bindings
            .borrow_mut()
            .drain()
            .map(|(_, binding)| binding)
            .collect();
        // Values are dropped after the borrow ends, closures may touch the frame
        drop(drained);
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.local_entries().into_iter().map(|(n, _)| n).collect();
        f.debug_struct("Scope")
            .field("names", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_sees_parent_bindings() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), true);
        let child = root.child();

        assert_eq!(child.get("x"), Some(Value::Number(1.0)));
        child.assign("x", Value::Number(2.0)).unwrap();
        assert_eq!(root.get("x"), Some(Value::Number(2.0)));
        assert!(!child.has_local("x"));
    }

    #[test]
    fn test_assign_rejects_constants_and_unknown_names() {
        let scope = Scope::root();
        scope.declare("limit", Value::Number(5.0), false);

        let err = scope.assign("limit", Value::Number(6.0)).unwrap_err();
        assert!(err.to_string().contains("constant"));

        let err = scope.assign("missing", Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "missing is not defined");
    }

    #[test]
    fn test_host_type_never_replaces_declaration() {
        let scope = Scope::root();
        scope.declare("Player", Value::str("mine"), true);

        assert!(!scope.bind_host_type("Player", Value::str("host")));
        assert_eq!(scope.get("Player"), Some(Value::str("mine")));

        assert!(scope.bind_host_type("World", Value::str("host")));
        assert_eq!(
            scope.binding("World").map(|b| b.kind),
            Some(BindingKind::HostType)
        );
        // Rebinding an import is fine
        assert!(scope.bind_host_type("World", Value::str("again")));
    }

    #[test]
    fn test_clear_empties_frame() {
        let scope = Scope::root();
        scope.declare("a", Value::Null, true);
        scope.declare_builtin("b", Value::Null);
        assert_eq!(scope.local_entries().len(), 2);

        scope.clear();
        assert!(scope.local_entries().is_empty());
        assert!(scope.get("a").is_none());
    }
}
