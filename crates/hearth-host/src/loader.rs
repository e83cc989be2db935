use std::fs;
use std::path::Path;

use crate::error::{HostError, HostResult};
use crate::module::Module;
use crate::registry::Host;
use crate::script::Script;

/// Builds modules from files of the extensions it is registered for
pub trait ModuleLoader {
    fn load_module(&self, file: &Path, host: &Host) -> HostResult<Module>;
}

/// Builds scripts from files of the extensions it is registered for
pub trait ScriptLoader {
    fn load_script(&self, file: &Path, host: &Host) -> HostResult<Script>;
}

/// Loads UTF-8 program text and compiles it with the host's evaluator
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceLoader;

impl SourceLoader {
    pub fn new() -> Self {
        Self
    }

    fn read(file: &Path) -> HostResult<String> {
        fs::read_to_string(file).map_err(|e| HostError::io(file, e))
    }
}

impl ModuleLoader for SourceLoader {
    fn load_module(&self, file: &Path, host: &Host) -> HostResult<Module> {
        Module::new(file, Self::read(file)?, host)
    }
}

impl ScriptLoader for SourceLoader {
    fn load_script(&self, file: &Path, host: &Host) -> HostResult<Script> {
        Script::new(file, Self::read(file)?, host)
    }
}
