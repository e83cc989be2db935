use std::cell::Cell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use hearth_runtime::{BindingKind, Program, Value};
use tracing::{debug, info, warn};

use crate::bindings;
use crate::capabilities::EventPriority;
use crate::config_store::ConfigMap;
use crate::context::ScriptContext;
use crate::error::{HostError, HostResult, UnitKind};
use crate::registry::{Host, WeakHost};
use crate::unit::{origin_of, unit_id, Unit};

/// Lifecycle of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Unloaded,
    Loading,
    Loaded,
    Disabled,
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptState::Unloaded => write!(f, "unloaded"),
            ScriptState::Loading => write!(f, "loading"),
            ScriptState::Loaded => write!(f, "loaded"),
            ScriptState::Disabled => write!(f, "disabled"),
        }
    }
}

/// A top-level unit with its own context, data folder and configuration
pub struct Script {
    id: String,
    file: PathBuf,
    source: String,
    program: Rc<dyn Program>,
    data_folder: PathBuf,
    context: Rc<ScriptContext>,
    config: Value,
    state: Cell<ScriptState>,
    host: WeakHost,
}

impl Script {
    /// Compile `source`, prepare the data folder and bind the host functions.
    /// Nothing in the script runs until [`Script::eval`].
    pub fn new(file: impl Into<PathBuf>, source: String, host: &Host) -> HostResult<Self> {
        let file = file.into();
        let id = unit_id(&file);
        let program = host
            .evaluator()
            .compile(&source, &origin_of(&file))
            .map_err(|e| HostError::eval(&id, e))?;

        let data_folder = file
            .parent()
            .map(|dir| dir.join(&id))
            .unwrap_or_else(|| PathBuf::from(&id));
        if data_folder.exists() && !data_folder.is_dir() {
            return Err(HostError::InvalidDataDir { path: data_folder });
        }
        fs::create_dir_all(&data_folder).map_err(|e| HostError::io(&data_folder, e))?;

        let config = match host.config_store() {
            Some(store) => store.load(&id, &data_folder)?,
            None => ConfigMap::new(),
        };
        let config = Value::from_json(&serde_json::Value::Object(config));

        let context = Rc::new(ScriptContext::new(
            id.clone(),
            host.evaluator().create_scope(),
            host.downgrade(),
        ));
        bindings::install(&context, &file, &data_folder, &config);

        Ok(Self {
            id,
            file,
            source,
            program,
            data_folder,
            context,
            config,
            state: Cell::new(ScriptState::Unloaded),
            host: host.downgrade(),
        })
    }

    pub fn state(&self) -> ScriptState {
        self.state.get()
    }

    pub fn context(&self) -> &Rc<ScriptContext> {
        &self.context
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current configuration as a JSON document
    pub fn config(&self) -> ConfigMap {
        match self.config.to_json() {
            Some(serde_json::Value::Object(map)) => map,
            _ => ConfigMap::new(),
        }
    }

    /// Run the script. A failed run leaves it `Unloaded`.
    pub fn eval(&self) -> HostResult<()> {
        let state = self.state.get();
        if state != ScriptState::Unloaded {
            return Err(HostError::InvalidState {
                id: self.id.clone(),
                state,
            });
        }

        self.state.set(ScriptState::Loading);
        match self.run() {
            Ok(()) => {
                self.state.set(ScriptState::Loaded);
                info!(target: "scripting", "Loaded script {}", self.id);
                Ok(())
            }
            Err(e) => {
                self.state.set(ScriptState::Unloaded);
                Err(e)
            }
        }
    }

    fn run(&self) -> HostResult<()> {
        let host = self.host.upgrade()?;

        if let Some(bootstrap) = host.bootstrap_module() {
            self.context.require(bootstrap)?;
        }

        host.importer()
            .import_into(&self.context, &self.source, &origin_of(&self.file))?;
        host.evaluator()
            .eval(self.program.as_ref(), self.context.scope())
            .map_err(|e| HostError::eval(&self.id, e))?;

        self.subscribe_handlers(&host);
        Ok(())
    }

    /// Subscribe top-level `onXxx` functions to the matching event type
    fn subscribe_handlers(&self, host: &Host) {
        for (name, binding) in self.context.scope().local_entries() {
            if binding.kind != BindingKind::Declared || !binding.value.is_callable() {
                continue;
            }
            let Some(event_name) = handler_event_name(&name) else {
                continue;
            };

            let importer = host.importer();
            let descriptor = importer
                .lookup(&format!("{}Event", event_name))
                .or_else(|| importer.lookup(event_name));
            let Some(descriptor) = descriptor.filter(|d| d.is_event()) else {
                continue;
            };

            host.capabilities().subscribe_event(
                &self.id,
                &descriptor,
                EventPriority::Normal,
                bindings::event_handler(host, binding.value),
            );
            debug!(target: "scripting", "{} handles {} with {}", self.id, descriptor, name);
        }
    }

    /// Shut the script down. Each step runs even if an earlier one failed;
    /// the first failure is returned.
    pub fn disable(&self) -> HostResult<()> {
        let state = self.state.get();
        if state == ScriptState::Disabled {
            return Err(HostError::InvalidState {
                id: self.id.clone(),
                state,
            });
        }

        let mut first_error = None;
        let mut record = |result: HostResult<()>| {
            if let Err(e) = result {
                warn!(target: "scripting", "Error disabling {}: {}", self.id, e);
                first_error.get_or_insert(e);
            }
        };

        record(self.call_on_disable());

        match self.host.upgrade() {
            Ok(host) => {
                host.capabilities().release(&self.id);
                if let Some(store) = host.config_store() {
                    record(store.save(&self.id, &self.data_folder, &self.config()));
                }
            }
            Err(e) => record(Err(e)),
        }

        self.context.scope().clear();
        self.state.set(ScriptState::Disabled);
        info!(target: "scripting", "Disabled script {}", self.id);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn call_on_disable(&self) -> HostResult<()> {
        let Some(callback) = self.context.scope().get("onDisable") else {
            return Ok(());
        };
        if !callback.is_callable() {
            return Ok(());
        }
        let host = self.host.upgrade()?;
        host.evaluator()
            .invoke(&callback, Vec::new())
            .map(|_| ())
            .map_err(|e| HostError::eval(&self.id, e))
    }
}

/// `onPlayerJoin` handles `PlayerJoin`; `on` alone or `onlyOnce` handle nothing
fn handler_event_name(function: &str) -> Option<&str> {
    let rest = function.strip_prefix("on")?;
    rest.starts_with(|c: char| c.is_uppercase()).then_some(rest)
}

impl Unit for Script {
    fn id(&self) -> &str {
        &self.id
    }

    fn file(&self) -> &Path {
        &self.file
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Script
    }

    fn host(&self) -> &WeakHost {
        &self.host
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_event_name() {
        assert_eq!(handler_event_name("onPlayerJoin"), Some("PlayerJoin"));
        assert_eq!(handler_event_name("onDisable"), Some("Disable"));
        assert_eq!(handler_event_name("on"), None);
        assert_eq!(handler_event_name("onlyOnce"), None);
        assert_eq!(handler_event_name("handle"), None);
    }
}
