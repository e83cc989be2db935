//! The host: loaders, loaded units and the bulk load/eval/shutdown sequence

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use hearth_runtime::Evaluator;
use tracing::{debug, info, warn};

use crate::capabilities::{HostCapabilities, HostTypes};
use crate::config_store::ConfigStore;
use crate::error::{HostError, HostResult, UnitKind};
use crate::importer::Importer;
use crate::loader::{ModuleLoader, ScriptLoader};
use crate::module::Module;
use crate::script::{Script, ScriptState};
use crate::unit::{unit_id, Unit};

/// Module every script requires before its own code runs
pub const DEFAULT_BOOTSTRAP_MODULE: &str = "finally";

/// Units by id, in registration order
struct UnitTable<T> {
    units: Vec<Rc<T>>,
    index: HashMap<String, usize>,
}

impl<T: Unit> UnitTable<T> {
    fn new() -> Self {
        Self {
            units: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn get(&self, id: &str) -> Option<Rc<T>> {
        self.index.get(id).map(|&i| Rc::clone(&self.units[i]))
    }

    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn insert(&mut self, unit: T) -> Rc<T> {
        let unit = Rc::new(unit);
        self.index.insert(unit.id().to_string(), self.units.len());
        self.units.push(Rc::clone(&unit));
        unit
    }

    fn all(&self) -> Vec<Rc<T>> {
        self.units.clone()
    }
}

/// A file that failed to load during a directory scan
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: HostError,
}

/// Outcome of a directory scan
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids of the units loaded, in file name order
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of evaluating or disabling every script
#[derive(Debug, Default)]
pub struct EvalReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, HostError)>,
}

impl EvalReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct HostInner {
    evaluator: Rc<dyn Evaluator>,
    capabilities: Rc<dyn HostCapabilities>,
    importer: Importer,
    config_store: Option<Rc<dyn ConfigStore>>,
    bootstrap_module: Option<String>,
    module_loaders: RefCell<HashMap<String, Rc<dyn ModuleLoader>>>,
    script_loaders: RefCell<HashMap<String, Rc<dyn ScriptLoader>>>,
    modules: RefCell<UnitTable<Module>>,
    scripts: RefCell<UnitTable<Script>>,
}

/// Catalog of loaders and loaded units.
///
/// Cloning shares the same host. Units refer back to it through [`WeakHost`]
/// and never keep it alive.
#[derive(Clone)]
pub struct Host(Rc<HostInner>);

/// Non-owning reference to a [`Host`]
#[derive(Clone, Default)]
pub struct WeakHost(Weak<HostInner>);

impl WeakHost {
    /// A reference that never upgrades
    pub fn new() -> Self {
        Self(Weak::new())
    }

    pub fn upgrade(&self) -> HostResult<Host> {
        self.0.upgrade().map(Host).ok_or(HostError::HostUnavailable)
    }
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub fn downgrade(&self) -> WeakHost {
        WeakHost(Rc::downgrade(&self.0))
    }

    pub fn evaluator(&self) -> Rc<dyn Evaluator> {
        Rc::clone(&self.0.evaluator)
    }

    pub fn capabilities(&self) -> &dyn HostCapabilities {
        self.0.capabilities.as_ref()
    }

    pub fn importer(&self) -> &Importer {
        &self.0.importer
    }

    pub fn config_store(&self) -> Option<&dyn ConfigStore> {
        self.0.config_store.as_deref()
    }

    pub fn bootstrap_module(&self) -> Option<&str> {
        self.0.bootstrap_module.as_deref()
    }

    /// Register `loader` for `extensions`, replacing earlier registrations
    pub fn add_module_loader(&self, loader: Rc<dyn ModuleLoader>, extensions: &[&str]) {
        let mut loaders = self.0.module_loaders.borrow_mut();
        for extension in extensions {
            let extension = normalize_extension(extension);
            if loaders.insert(extension.clone(), Rc::clone(&loader)).is_some() {
                debug!(target: "scripting", "Replaced module loader for .{}", extension);
            }
        }
    }

    /// Register `loader` for `extensions`, replacing earlier registrations
    pub fn add_script_loader(&self, loader: Rc<dyn ScriptLoader>, extensions: &[&str]) {
        let mut loaders = self.0.script_loaders.borrow_mut();
        for extension in extensions {
            let extension = normalize_extension(extension);
            if loaders.insert(extension.clone(), Rc::clone(&loader)).is_some() {
                debug!(target: "scripting", "Replaced script loader for .{}", extension);
            }
        }
    }

    pub fn module_loader_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<_> = self.0.module_loaders.borrow().keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn script_loader_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<_> = self.0.script_loaders.borrow().keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn module(&self, id: &str) -> Option<Rc<Module>> {
        self.0.modules.borrow().get(id)
    }

    pub fn modules(&self) -> Vec<Rc<Module>> {
        self.0.modules.borrow().all()
    }

    pub fn script(&self, id: &str) -> Option<Rc<Script>> {
        self.0.scripts.borrow().get(id)
    }

    pub fn scripts(&self) -> Vec<Rc<Script>> {
        self.0.scripts.borrow().all()
    }

    pub fn load_module(&self, file: &Path) -> HostResult<Rc<Module>> {
        let extension = extension_of(file);
        let loader = self
            .0
            .module_loaders
            .borrow()
            .get(&extension)
            .cloned()
            .ok_or_else(|| HostError::NoLoader {
                path: file.to_path_buf(),
                extension,
            })?;

        let id = unit_id(file);
        if self.0.modules.borrow().contains(&id) {
            return Err(HostError::DuplicateId {
                kind: UnitKind::Module,
                id,
            });
        }

        let module = loader.load_module(file, self)?;
        let mut modules = self.0.modules.borrow_mut();
        if modules.contains(module.id()) {
            return Err(HostError::DuplicateId {
                kind: UnitKind::Module,
                id: module.id().to_string(),
            });
        }
        Ok(modules.insert(module))
    }

    pub fn load_script(&self, file: &Path) -> HostResult<Rc<Script>> {
        let extension = extension_of(file);
        let loader = self
            .0
            .script_loaders
            .borrow()
            .get(&extension)
            .cloned()
            .ok_or_else(|| HostError::NoLoader {
                path: file.to_path_buf(),
                extension,
            })?;

        let id = unit_id(file);
        if self.0.scripts.borrow().contains(&id) {
            return Err(HostError::DuplicateId {
                kind: UnitKind::Script,
                id,
            });
        }

        let script = loader.load_script(file, self)?;
        let mut scripts = self.0.scripts.borrow_mut();
        if scripts.contains(script.id()) {
            return Err(HostError::DuplicateId {
                kind: UnitKind::Script,
                id: script.id().to_string(),
            });
        }
        Ok(scripts.insert(script))
    }

    /// Load every file in `dir` as a module
    pub fn load_modules(&self, dir: &Path) -> LoadReport {
        let report = self.scan(dir, UnitKind::Module, |file| {
            self.load_module(file).map(|m| m.id().to_string())
        });
        info!(target: "scripting", "Loaded {} module(s) from {}", report.loaded.len(), dir.display());
        report
    }

    /// Load every file in `dir` as a script
    pub fn load_scripts(&self, dir: &Path) -> LoadReport {
        let report = self.scan(dir, UnitKind::Script, |file| {
            self.load_script(file).map(|s| s.id().to_string())
        });
        info!(target: "scripting", "Loaded {} script(s) from {}", report.loaded.len(), dir.display());
        report
    }

    fn scan<F>(&self, dir: &Path, kind: UnitKind, mut load: F) -> LoadReport
    where
        F: FnMut(&Path) -> HostResult<String>,
    {
        let mut report = LoadReport::default();

        let files = match list_files(dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(target: "scripting", "Failed to scan {} directory: {}", kind, e);
                report.failed.push(LoadFailure {
                    path: dir.to_path_buf(),
                    error: e,
                });
                return report;
            }
        };

        for file in files {
            match load(&file) {
                Ok(id) => report.loaded.push(id),
                Err(e) => {
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    warn!(target: "scripting", "Failed to load {} {}: {}", kind, name, e);
                    report.failed.push(LoadFailure {
                        path: file,
                        error: e,
                    });
                }
            }
        }

        report
    }

    /// Evaluate every script that has not run yet, in registration order
    pub fn eval_scripts(&self) -> EvalReport {
        let _bulk = self.importer().bulk();
        let mut report = EvalReport::default();

        for script in self.scripts() {
            if script.state() != ScriptState::Unloaded {
                continue;
            }
            match script.eval() {
                Ok(()) => report.succeeded.push(script.id().to_string()),
                Err(e) => {
                    warn!(target: "scripting", "Failed to evaluate script {}: {}", script.id(), e);
                    if let Some(stack) = e.script_stack() {
                        warn!(target: "scripting", "Script stack for {}:\n{}", script.id(), stack);
                    }
                    report.failed.push((script.id().to_string(), e));
                }
            }
        }

        report
    }

    /// Disable every script, in registration order
    pub fn on_disable(&self) -> EvalReport {
        let mut report = EvalReport::default();

        for script in self.scripts() {
            if script.state() == ScriptState::Disabled {
                continue;
            }
            match script.disable() {
                Ok(()) => report.succeeded.push(script.id().to_string()),
                Err(e) => {
                    warn!(target: "scripting", "Failed to disable script {}: {}", script.id(), e);
                    report.failed.push((script.id().to_string(), e));
                }
            }
        }

        report
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(file: &Path) -> String {
    file.extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

/// Direct non-directory entries of `dir` in file name order, creating `dir` if missing
fn list_files(dir: &Path) -> HostResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| HostError::io(dir, e))?;
    let entries = fs::read_dir(dir).map_err(|e| HostError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HostError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Error during builder configuration
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Evaluator not specified - use .evaluator()")]
    MissingEvaluator,
    #[error("Host capabilities not specified - use .capabilities()")]
    MissingCapabilities,
    #[error("Host types not specified - use .types()")]
    MissingTypes,
}

/// Builder for [`Host`]
pub struct HostBuilder {
    evaluator: Option<Rc<dyn Evaluator>>,
    capabilities: Option<Rc<dyn HostCapabilities>>,
    types: Option<Rc<dyn HostTypes>>,
    config_store: Option<Rc<dyn ConfigStore>>,
    root_namespace: String,
    bootstrap_module: Option<String>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            evaluator: None,
            capabilities: None,
            types: None,
            config_store: None,
            root_namespace: String::new(),
            bootstrap_module: Some(DEFAULT_BOOTSTRAP_MODULE.to_string()),
        }
    }

    pub fn evaluator(mut self, evaluator: Rc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn capabilities(mut self, capabilities: Rc<dyn HostCapabilities>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn types(mut self, types: Rc<dyn HostTypes>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn config_store(mut self, store: Rc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Only host types under this namespace are importable
    pub fn root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.root_namespace = namespace.into();
        self
    }

    pub fn bootstrap_module(mut self, id: impl Into<String>) -> Self {
        self.bootstrap_module = Some(id.into());
        self
    }

    /// Scripts run without requiring a bootstrap module first
    pub fn without_bootstrap(mut self) -> Self {
        self.bootstrap_module = None;
        self
    }

    pub fn build(self) -> Result<Host, BuildError> {
        let evaluator = self.evaluator.ok_or(BuildError::MissingEvaluator)?;
        let capabilities = self.capabilities.ok_or(BuildError::MissingCapabilities)?;
        let types = self.types.ok_or(BuildError::MissingTypes)?;

        let importer = Importer::new(Rc::clone(&evaluator), types, self.root_namespace);
        Ok(Host(Rc::new(HostInner {
            evaluator,
            capabilities,
            importer,
            config_store: self.config_store,
            bootstrap_module: self.bootstrap_module,
            module_loaders: RefCell::new(HashMap::new()),
            script_loaders: RefCell::new(HashMap::new()),
            modules: RefCell::new(UnitTable::new()),
            scripts: RefCell::new(UnitTable::new()),
        })))
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}
