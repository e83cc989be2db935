use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use hearth_runtime::Program;
use tracing::debug;

use crate::context::ScriptContext;
use crate::error::{HostError, HostResult, UnitKind};
use crate::registry::{Host, WeakHost};
use crate::unit::{origin_of, unit_id, Unit};

/// A reusable unit installed into script contexts through `require`.
///
/// Compiled once; applying it to a context runs the whole program again in
/// that context's scope.
pub struct Module {
    id: String,
    file: PathBuf,
    source: String,
    program: Rc<dyn Program>,
    host: WeakHost,
}

impl Module {
    pub fn new(file: impl Into<PathBuf>, source: String, host: &Host) -> HostResult<Self> {
        let file = file.into();
        let id = unit_id(&file);
        let program = host
            .evaluator()
            .compile(&source, &origin_of(&file))
            .map_err(|e| HostError::eval(&id, e))?;

        Ok(Self {
            id,
            file,
            source,
            program,
            host: host.downgrade(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Import the host types this module uses, then run it in `context`
    pub fn apply(&self, context: &ScriptContext) -> HostResult<()> {
        let host = self.host.upgrade()?;
        let origin = origin_of(&self.file);

        host.importer()
            .import_into(context, &self.source, &origin)?;
        host.evaluator()
            .eval(self.program.as_ref(), context.scope())
            .map_err(|e| HostError::eval(&self.id, e))?;

        debug!(target: "scripting", "Applied module {} to {}", self.id, context.owner());
        Ok(())
    }
}

impl Unit for Module {
    fn id(&self) -> &str {
        &self.id
    }

    fn file(&self) -> &Path {
        &self.file
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Module
    }

    fn host(&self) -> &WeakHost {
        &self.host
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("file", &self.file)
            .finish()
    }
}
