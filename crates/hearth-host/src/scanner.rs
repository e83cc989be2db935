//! Identifier scanning for capability import
//!
//! Finds the bare names a unit refers to, so only the host types it actually
//! uses get bound into its scope.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use hearth_runtime::{EvalError, Evaluator};

use crate::error::{HostError, HostResult};

/// Every name used as an identifier expression in `source`.
///
/// Declared names, parameters, property names, object keys and string
/// contents are not identifier expressions and are left out.
pub fn scan_identifiers(
    evaluator: &dyn Evaluator,
    source: &str,
    origin: &str,
) -> Result<BTreeSet<String>, EvalError> {
    let tree = evaluator.parse(source, origin)?;
    Ok(tree
        .identifiers()
        .into_iter()
        .map(str::to_string)
        .collect())
}

pub fn scan_file(evaluator: &dyn Evaluator, path: &Path) -> HostResult<BTreeSet<String>> {
    let source = fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
    let origin = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    scan_identifiers(evaluator, &source, &origin).map_err(|e| HostError::eval(origin, e))
}
