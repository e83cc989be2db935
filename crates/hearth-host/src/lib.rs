//! Host runtime for loading modules and scripts
//!
//! Scripts each run in their own context and pull in shared modules with
//! `require`. Host types are bound into a unit's scope only when the unit's
//! source names them.

pub mod bindings;
pub mod capabilities;
pub mod config_store;
pub mod context;
pub mod error;
pub mod importer;
pub mod loader;
pub mod local;
pub mod module;
pub mod registry;
pub mod scanner;
pub mod script;
pub mod timer;
pub mod unit;

pub use capabilities::{
    CommandHandler, EventHandler, EventPriority, HostCapabilities, HostTypes, StaticTypes,
    SubscriptionId, TaskCallback, TaskId, Timing,
};
pub use config_store::{ConfigMap, ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use context::ScriptContext;
pub use error::{HostError, HostResult, UnitKind};
pub use importer::{BulkImport, Importer, TypeRegistry};
pub use loader::{ModuleLoader, ScriptLoader, SourceLoader};
pub use local::LocalHost;
pub use module::Module;
pub use registry::{
    BuildError, EvalReport, Host, HostBuilder, LoadFailure, LoadReport, WeakHost,
    DEFAULT_BOOTSTRAP_MODULE,
};
pub use scanner::{scan_file, scan_identifiers};
pub use script::{Script, ScriptState};
pub use unit::{unit_id, Unit};

/// Id of the bundled bootstrap module
pub const BOOTSTRAP_MODULE_ID: &str = DEFAULT_BOOTSTRAP_MODULE;

/// Source of the bundled bootstrap module, to be written into the modules directory
pub const BOOTSTRAP_SOURCE: &str = include_str!("../resources/finally.js");
