use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use hearth_runtime::{EvalError, TypeDescriptor, Value};

pub use crate::timer::Timing;

/// Ids handed out for scheduled tasks
pub type TaskId = crate::timer::TimerId;

/// Called with the event payload
pub type EventHandler = Rc<dyn Fn(&Value) -> Result<(), EvalError>>;

/// Called with the sender name and the argument list; returns whether the command was handled
pub type CommandHandler = Rc<dyn Fn(&str, &[String]) -> Result<bool, EvalError>>;

pub type TaskCallback = Rc<dyn Fn() -> Result<(), EvalError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Order in which event handlers run, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    /// Observes the outcome; runs last
    Monitor,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event priority '{0}'")]
pub struct ParsePriorityError(pub String);

impl FromStr for EventPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOWEST" => Ok(EventPriority::Lowest),
            "LOW" => Ok(EventPriority::Low),
            "NORMAL" => Ok(EventPriority::Normal),
            "HIGH" => Ok(EventPriority::High),
            "HIGHEST" => Ok(EventPriority::Highest),
            "MONITOR" => Ok(EventPriority::Monitor),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventPriority::Lowest => "LOWEST",
            EventPriority::Low => "LOW",
            EventPriority::Normal => "NORMAL",
            EventPriority::High => "HIGH",
            EventPriority::Highest => "HIGHEST",
            EventPriority::Monitor => "MONITOR",
        };
        write!(f, "{}", name)
    }
}

/// What the hosting application offers to scripts.
///
/// Every registration names its owning script so it can be dropped in one
/// call when that script is disabled.
pub trait HostCapabilities {
    fn subscribe_event(
        &self,
        owner: &str,
        event: &TypeDescriptor,
        priority: EventPriority,
        handler: EventHandler,
    ) -> SubscriptionId;

    /// Returns false when the name was already taken and a prefixed name was used instead
    fn register_command(&self, owner: &str, name: &str, handler: CommandHandler) -> bool;

    /// Background tasks are timed off the control thread; the callback itself
    /// still runs on the control thread.
    fn schedule(
        &self,
        owner: &str,
        callback: TaskCallback,
        timing: Timing,
        background: bool,
    ) -> TaskId;

    fn cancel_task(&self, id: TaskId) -> bool;

    /// Drop every event subscription, command and task owned by `owner`
    fn release(&self, owner: &str);
}

/// Enumerates the public types of the hosting application
pub trait HostTypes {
    fn list_public_types(&self, root_namespace: &str) -> Vec<TypeDescriptor>;
}

/// A fixed set of host types
#[derive(Debug, Clone, Default)]
pub struct StaticTypes {
    types: Vec<TypeDescriptor>,
}

impl StaticTypes {
    pub fn new(types: Vec<TypeDescriptor>) -> Self {
        Self { types }
    }

    pub fn push(&mut self, descriptor: TypeDescriptor) {
        self.types.push(descriptor);
    }
}

impl HostTypes for StaticTypes {
    fn list_public_types(&self, root_namespace: &str) -> Vec<TypeDescriptor> {
        self.types
            .iter()
            .filter(|ty| ty.in_namespace(root_namespace))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parsing_ignores_case() {
        assert_eq!("high".parse::<EventPriority>().unwrap(), EventPriority::High);
        assert_eq!("MONITOR".parse::<EventPriority>().unwrap(), EventPriority::Monitor);
        assert!("urgent".parse::<EventPriority>().is_err());
        assert!(EventPriority::Lowest < EventPriority::Monitor);
        assert_eq!(EventPriority::default(), EventPriority::Normal);
    }

    #[test]
    fn test_static_types_filter_namespace() {
        let types = StaticTypes::new(vec![
            TypeDescriptor::class("org.example.Player"),
            TypeDescriptor::class("com.other.Player"),
        ]);
        let listed = types.list_public_types("org.example");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].qualified_name, "org.example.Player");
    }
}
