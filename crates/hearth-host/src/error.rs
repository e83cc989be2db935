use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use hearth_runtime::EvalError;

use crate::script::ScriptState;

/// The two unit namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Module,
    Script,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Module => write!(f, "module"),
            UnitKind::Script => write!(f, "script"),
        }
    }
}

/// Errors raised by the unit registry and execution contexts
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{kind} '{id}' is already loaded")]
    DuplicateId { kind: UnitKind, id: String },

    #[error("no loader registered for '.{extension}' files ({})", .path.display())]
    NoLoader { path: PathBuf, extension: String },

    #[error("circular dependency on module '{id}' ({})", .chain.join(" -> "))]
    CircularDependency { id: String, chain: Vec<String> },

    #[error("module '{id}' not found")]
    NotFound { id: String },

    #[error("script '{id}' is {state}")]
    InvalidState { id: String, state: ScriptState },

    #[error("{unit}: {source}")]
    Eval {
        unit: String,
        #[source]
        source: EvalError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data folder {} exists and is not a directory", .path.display())]
    InvalidDataDir { path: PathBuf },

    #[error("invalid configuration {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("host is no longer available")]
    HostUnavailable,
}

pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn eval(unit: impl Into<String>, source: EvalError) -> Self {
        HostError::Eval {
            unit: unit.into(),
            source,
        }
    }

    /// Errors caused by how the host was driven rather than by the environment
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            HostError::DuplicateId { .. }
                | HostError::NoLoader { .. }
                | HostError::CircularDependency { .. }
                | HostError::NotFound { .. }
                | HostError::InvalidState { .. }
        )
    }

    /// Find a circular dependency anywhere in this error's source chain.
    ///
    /// A cycle detected inside nested `require` calls reaches the registry
    /// wrapped in evaluation errors, one layer per module on the chain.
    pub fn circular_dependency(&self) -> Option<&HostError> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(host @ HostError::CircularDependency { .. }) = err.downcast_ref::<HostError>()
            {
                return Some(host);
            }
            current = err.source();
        }
        None
    }

    /// Script stack of the evaluation error behind this one, if any
    pub fn script_stack(&self) -> Option<String> {
        match self {
            HostError::Eval { source, .. } if !source.stack().is_empty() => {
                Some(source.script_stack())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        let dup = HostError::DuplicateId {
            kind: UnitKind::Module,
            id: "a".to_string(),
        };
        assert!(dup.is_caller_error());
        assert_eq!(dup.to_string(), "module 'a' is already loaded");

        let io = HostError::io(
            "scripts",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_caller_error());
        assert!(!HostError::HostUnavailable.is_caller_error());
    }

    #[test]
    fn test_circular_dependency_found_through_eval_errors() {
        let cycle = HostError::CircularDependency {
            id: "a".to_string(),
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(
            cycle.to_string(),
            "circular dependency on module 'a' (a -> b -> a)"
        );

        let wrapped = HostError::eval("b", EvalError::native("require", cycle));
        let wrapped = HostError::eval("a", EvalError::native("require", wrapped));

        match wrapped.circular_dependency() {
            Some(HostError::CircularDependency { id, chain }) => {
                assert_eq!(id, "a");
                assert_eq!(chain.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(HostError::HostUnavailable.circular_dependency().is_none());
    }
}
