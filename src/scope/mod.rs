//! Project scope resolution.
//!
//! A module evaluates either inside a project scope (the directory holding a
//! boundary-marker file, which pins shared import roots and dependency
//! locks) or standalone when no scope exists. The resolver walks the working
//! tree for marker files on the module's ancestor chain; anything off that
//! chain is pruned so sibling projects never leak in.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Name of the boundary-marker file designating a project scope root.
pub const PROJECT_MARKER: &str = "PROJECT";

/// Errors raised while resolving a module's project scope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// No marker file governs the module. Recoverable: callers fall back to
    /// a standalone evaluation session.
    #[error("no {} found for module '{}'", PROJECT_MARKER, module.display())]
    NotFound { module: PathBuf },

    /// More than one marker file governs the module.
    #[error("more than one {} found for module '{}':\n{}", PROJECT_MARKER, module.display(), format_candidates(candidates))]
    Ambiguous {
        module: PathBuf,
        /// Conflicting scope directories in walk-discovery order.
        candidates: Vec<PathBuf>,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to determine working directory: {0}")]
    WorkingDir(std::io::Error),
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve the project scope for `module`, walking from the current working
/// directory.
pub fn resolve(module: &Path, explicit: Option<&Path>) -> Result<PathBuf, ScopeError> {
    let root = std::env::current_dir().map_err(ScopeError::WorkingDir)?;
    resolve_in(&root, module, explicit)
}

/// Resolve the project scope for `module`, walking the tree under `root`.
///
/// A non-empty `explicit` path that exists on disk short-circuits the search
/// and is returned as the scope verbatim. Otherwise every directory that is
/// not an ancestor of `module` is pruned (component-wise prefix test, so
/// `/foo` never claims `/foobar/mod.cfg`), and each marker file in the
/// remaining chain contributes one candidate. `module` should be absolute,
/// like the walk root.
pub fn resolve_in(
    root: &Path,
    module: &Path,
    explicit: Option<&Path>,
) -> Result<PathBuf, ScopeError> {
    if let Some(path) = explicit {
        if !path.as_os_str().is_empty() && path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.file_type().is_dir() || governs(entry.path(), module));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == PROJECT_MARKER {
            if let Some(parent) = entry.path().parent() {
                candidates.push(parent.to_path_buf());
            }
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(ScopeError::NotFound {
            module: module.to_path_buf(),
        }),
        _ => Err(ScopeError::Ambiguous {
            module: module.to_path_buf(),
            candidates,
        }),
    }
}

/// Whether `dir` lies on the ancestor chain of `module`.
fn governs(dir: &Path, module: &Path) -> bool {
    match module.strip_prefix(dir) {
        Ok(rest) => !rest.as_os_str().is_empty(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_single_marker_on_ancestor_chain() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("cfg/PROJECT"));
        touch(&root.join("cfg/app.module"));

        let scope = resolve_in(root, &root.join("cfg/app.module"), None).unwrap();
        assert_eq!(scope, root.join("cfg"));
    }

    #[test]
    fn test_no_marker_is_not_found() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("cfg/app.module"));

        let err = resolve_in(root, &root.join("cfg/app.module"), None).unwrap_err();
        match err {
            ScopeError::NotFound { module } => {
                assert_eq!(module, root.join("cfg/app.module"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_two_markers_are_ambiguous_in_discovery_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("cfg/PROJECT"));
        touch(&root.join("cfg/nested/PROJECT"));
        touch(&root.join("cfg/nested/app.module"));

        let err = resolve_in(root, &root.join("cfg/nested/app.module"), None).unwrap_err();
        match err {
            ScopeError::Ambiguous { candidates, .. } => {
                assert_eq!(
                    candidates,
                    vec![root.join("cfg"), root.join("cfg/nested")]
                );
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_sibling_directory_prefix_does_not_match() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        // `foo` must not govern a module under `foobar`.
        touch(&root.join("foo/PROJECT"));
        touch(&root.join("foobar/app.module"));

        let err = resolve_in(root, &root.join("foobar/app.module"), None).unwrap_err();
        assert!(matches!(err, ScopeError::NotFound { .. }));
    }

    #[test]
    fn test_marker_off_the_ancestor_chain_is_pruned() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/PROJECT"));
        touch(&root.join("b/app.module"));
        touch(&root.join("b/PROJECT"));

        let scope = resolve_in(root, &root.join("b/app.module"), None).unwrap();
        assert_eq!(scope, root.join("b"));
    }

    #[test]
    fn test_explicit_path_short_circuits() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("cfg/PROJECT"));
        touch(&root.join("cfg/app.module"));
        touch(&root.join("elsewhere/PROJECT"));

        let scope = resolve_in(
            root,
            &root.join("cfg/app.module"),
            Some(&root.join("elsewhere")),
        )
        .unwrap();
        assert_eq!(scope, root.join("elsewhere"));
    }

    #[test]
    fn test_missing_explicit_path_falls_back_to_search() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("cfg/PROJECT"));
        touch(&root.join("cfg/app.module"));

        let scope = resolve_in(
            root,
            &root.join("cfg/app.module"),
            Some(&root.join("does-not-exist")),
        )
        .unwrap();
        assert_eq!(scope, root.join("cfg"));
    }
}
