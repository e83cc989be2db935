use std::path::Path;

use crate::error::UnitKind;
use crate::registry::WeakHost;

/// A named, file-backed piece of program text owned by a host
pub trait Unit {
    fn id(&self) -> &str;

    fn file(&self) -> &Path;

    fn kind(&self) -> UnitKind;

    fn host(&self) -> &WeakHost;
}

/// Unit id for a backing file: the file name without its extension
pub fn unit_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name used as the origin label in syntax errors and stacks
pub(crate) fn origin_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_strips_extension() {
        assert_eq!(unit_id(Path::new("scripts/a.js")), "a");
        assert_eq!(unit_id(Path::new("lib.min.js")), "lib.min");
        assert_eq!(unit_id(Path::new("noext")), "noext");
        assert_eq!(origin_of(Path::new("scripts/a.js")), "a.js");
    }
}
