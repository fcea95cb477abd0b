//! Script storage layout and path-traversal protection.
//!
//! Global scripts live under `resources/global_scripts/…`, custom scripts
//! under `resources/custom_scripts/<workspace>/…`. Stored `file_path`
//! values are relative; resolution rejects anything that could escape the
//! base directory before the path reaches the worker engine.

use miniflow_core::WorkspaceId;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Default location of global scripts, relative to the resource root.
pub const GLOBAL_SCRIPTS_DIR: &str = "global_scripts";

/// Default location of custom scripts, relative to the resource root.
pub const CUSTOM_SCRIPTS_DIR: &str = "custom_scripts";

/// Error returned when a stored path is unsafe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafePathError {
    /// The offending path.
    pub path: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl fmt::Display for UnsafePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsafe script path '{}': {}", self.path, self.reason)
    }
}

impl std::error::Error for UnsafePathError {}

/// The script directories of one engine installation.
#[derive(Debug, Clone)]
pub struct ScriptRoots {
    global_root: PathBuf,
    custom_root: PathBuf,
}

impl ScriptRoots {
    /// Creates script roots under a resource directory.
    #[must_use]
    pub fn new(resource_root: impl Into<PathBuf>) -> Self {
        let resource_root = resource_root.into();
        Self {
            global_root: resource_root.join(GLOBAL_SCRIPTS_DIR),
            custom_root: resource_root.join(CUSTOM_SCRIPTS_DIR),
        }
    }

    /// Resolves a global script's stored path.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored path is absolute, contains `..`, or
    /// would otherwise escape the global script root.
    pub fn global_script_path(&self, file_path: &str) -> Result<PathBuf, UnsafePathError> {
        resolve_under(&self.global_root, file_path)
    }

    /// Resolves a custom script's stored path inside its workspace
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored path would escape the workspace's
    /// script directory.
    pub fn custom_script_path(
        &self,
        workspace_id: WorkspaceId,
        file_path: &str,
    ) -> Result<PathBuf, UnsafePathError> {
        let workspace_root = self.custom_root.join(workspace_id.to_string());
        resolve_under(&workspace_root, file_path)
    }
}

/// Joins `relative` onto `base`, rejecting anything that could step out.
fn resolve_under(base: &Path, relative: &str) -> Result<PathBuf, UnsafePathError> {
    if relative.is_empty() {
        return Err(UnsafePathError {
            path: relative.to_string(),
            reason: "empty path",
        });
    }

    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(UnsafePathError {
                    path: relative.to_string(),
                    reason: "parent directory traversal",
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UnsafePathError {
                    path: relative.to_string(),
                    reason: "absolute path",
                });
            }
        }
    }

    let resolved = base.join(candidate);
    // Belt and braces: the component walk above should make this
    // unreachable, but the prefix check costs nothing.
    if !resolved.starts_with(base) {
        return Err(UnsafePathError {
            path: relative.to_string(),
            reason: "escapes base directory",
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> ScriptRoots {
        ScriptRoots::new("/srv/miniflow/resources")
    }

    #[test]
    fn resolves_global_script() {
        let path = roots()
            .global_script_path("math/arithmetic/power_numbers.py")
            .expect("should resolve");
        assert_eq!(
            path,
            PathBuf::from("/srv/miniflow/resources/global_scripts/math/arithmetic/power_numbers.py")
        );
    }

    #[test]
    fn custom_scripts_are_workspace_scoped() {
        let workspace_id = WorkspaceId::new();
        let path = roots()
            .custom_script_path(workspace_id, "etl/clean.py")
            .expect("should resolve");
        assert!(
            path.starts_with(format!(
                "/srv/miniflow/resources/custom_scripts/{workspace_id}"
            ))
        );
    }

    #[test]
    fn rejects_parent_traversal() {
        let err = roots()
            .global_script_path("../../../etc/passwd")
            .unwrap_err();
        assert_eq!(err.reason, "parent directory traversal");
    }

    #[test]
    fn rejects_embedded_traversal() {
        assert!(roots().global_script_path("math/../../escape.py").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        let err = roots().global_script_path("/etc/passwd").unwrap_err();
        assert_eq!(err.reason, "absolute path");
    }

    #[test]
    fn rejects_empty_path() {
        assert!(roots().global_script_path("").is_err());
    }

    #[test]
    fn allows_current_dir_components() {
        assert!(roots().global_script_path("./math/add.py").is_ok());
    }
}
