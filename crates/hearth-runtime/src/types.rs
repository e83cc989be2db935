use serde::{Deserialize, Serialize};
use std::fmt;

/// What a host type is, as far as scripts are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Class,
    /// Can be subscribed to through the event bus
    Event,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Event => write!(f, "event"),
        }
    }
}

/// A public host type, as enumerated from the host's API surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub simple_name: String,
    pub qualified_name: String,
    #[serde(default)]
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn new(qualified_name: impl Into<String>, kind: TypeKind) -> Self {
        let qualified_name = qualified_name.into();
        let simple_name = qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();
        Self {
            simple_name,
            qualified_name,
            kind,
        }
    }

    pub fn class(qualified_name: impl Into<String>) -> Self {
        Self::new(qualified_name, TypeKind::Class)
    }

    pub fn event(qualified_name: impl Into<String>) -> Self {
        Self::new(qualified_name, TypeKind::Event)
    }

    pub fn is_event(&self) -> bool {
        self.kind == TypeKind::Event
    }

    /// Whether this type lives under `namespace` (dot separated)
    pub fn in_namespace(&self, namespace: &str) -> bool {
        namespace.is_empty()
            || self
                .qualified_name
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name_is_last_segment() {
        let ty = TypeDescriptor::class("org.example.entity.Player");
        assert_eq!(ty.simple_name, "Player");
        assert_eq!(ty.kind, TypeKind::Class);

        let bare = TypeDescriptor::event("Tick");
        assert_eq!(bare.simple_name, "Tick");
        assert!(bare.is_event());
    }

    #[test]
    fn test_namespace_matching() {
        let ty = TypeDescriptor::class("org.example.Player");
        assert!(ty.in_namespace("org.example"));
        assert!(ty.in_namespace("org"));
        assert!(ty.in_namespace(""));
        assert!(!ty.in_namespace("org.exam"));
        assert!(!ty.in_namespace("org.example.Player"));
    }

    #[test]
    fn test_kind_defaults_to_class_when_deserialized() {
        let ty: TypeDescriptor = serde_json::from_str(
            r#"{"simple_name":"Location","qualified_name":"org.example.Location"}"#,
        )
        .unwrap();
        assert_eq!(ty.kind, TypeKind::Class);
    }
}
