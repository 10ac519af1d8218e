//! Render orchestration.
//!
//! A render call resolves the module's project scope, builds an engine
//! session with the secret resource handlers attached, evaluates the
//! requested expression and returns one deferred write effect. The renderer
//! never writes anything itself; applying the effect is the caller's move.

use std::path::{Component, Path, PathBuf};

use strata_store::LayeredStore;

use crate::bridge::SecretHandler;
use crate::effects::Effect;
use crate::engine::{EngineError, EngineSession, EngineTransport};
use crate::scope::{self, ScopeError};
use crate::secrets::Decryptor;

/// Expression evaluated when the caller does not supply one.
pub const DEFAULT_EXPRESSION: &str = "output.text";

/// Expression evaluated in multi-file mode.
pub const FILES_EXPRESSION: &str = "output.files";

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Module file to evaluate. Must exist.
    pub module: PathBuf,
    /// Expression override; defaults to [`DEFAULT_EXPRESSION`]
    /// ([`FILES_EXPRESSION`] in multi-file mode).
    pub expression: Option<String>,
    /// Destination path (a directory in multi-file mode).
    pub output: PathBuf,
    /// Explicit project scope directory, bypassing the tree search.
    pub project_path: Option<PathBuf>,
    /// Split the output into multiple files.
    pub multi_file: bool,
}

/// Errors raised by a render call.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("module '{}' does not exist", module.display())]
    ModuleNotFound { module: PathBuf },

    /// Scope resolution failed. Only the ambiguous case reaches callers;
    /// a missing scope falls back to a standalone session.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("multi-file output rejected: {reason}")]
    InvalidFileSet { reason: String },
}

/// Render `request`, walking for the project scope from the current working
/// directory.
pub fn render(
    request: &RenderRequest,
    secrets: &LayeredStore,
    decryptor: &dyn Decryptor,
    transport: Box<dyn EngineTransport>,
) -> Result<Effect, RenderError> {
    let root = std::env::current_dir().map_err(ScopeError::WorkingDir)?;
    render_in(&root, request, secrets, decryptor, transport)
}

/// Render `request`, walking for the project scope under `root`.
pub fn render_in(
    root: &Path,
    request: &RenderRequest,
    secrets: &LayeredStore,
    decryptor: &dyn Decryptor,
    transport: Box<dyn EngineTransport>,
) -> Result<Effect, RenderError> {
    if !request.module.is_file() {
        return Err(RenderError::ModuleNotFound {
            module: request.module.clone(),
        });
    }

    // A module with no enclosing project is legitimate: only ambiguity is
    // fatal, absence selects a standalone session.
    let project_dir = match scope::resolve_in(root, &request.module, request.project_path.as_deref())
    {
        Ok(dir) => Some(dir),
        Err(ScopeError::NotFound { .. }) => None,
        Err(err) => return Err(err.into()),
    };

    let mut session = EngineSession::new(transport)
        .with_handler(SecretHandler::KeyedLookup { secrets })
        .with_handler(SecretHandler::RawBlob { decryptor })
        .with_handler(SecretHandler::ArchiveMember { decryptor });

    let expression = match (&request.expression, request.multi_file) {
        (Some(expression), _) => expression.clone(),
        (None, true) => FILES_EXPRESSION.to_string(),
        (None, false) => DEFAULT_EXPRESSION.to_string(),
    };

    let output = session.evaluate(&request.module, &expression, project_dir.as_deref())?;

    if request.multi_file {
        file_set_effect(&request.output, &output)
    } else {
        Ok(Effect::write_file(
            request.output.clone(),
            output.into_bytes(),
        ))
    }
}

/// Turn an `output.files` result into a compound of writes under `dir`.
///
/// The result must be a JSON object of relative path to file text; entries
/// are written in sorted order so repeated renders behave identically.
fn file_set_effect(dir: &Path, output: &str) -> Result<Effect, RenderError> {
    let value: serde_json::Value =
        serde_json::from_str(output).map_err(|e| RenderError::InvalidFileSet {
            reason: format!("expected a table of files, got unparseable output: {}", e),
        })?;
    let table = value.as_object().ok_or_else(|| RenderError::InvalidFileSet {
        reason: "expected a table of files".to_string(),
    })?;

    let mut entries: Vec<(&String, &serde_json::Value)> = table.iter().collect();
    entries.sort_by_key(|(name, _)| name.as_str());

    let mut effects = Vec::with_capacity(entries.len());
    for (name, content) in entries {
        let content = content.as_str().ok_or_else(|| RenderError::InvalidFileSet {
            reason: format!("file '{}' is not text", name),
        })?;
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(RenderError::InvalidFileSet {
                reason: format!("file path '{}' escapes the output directory", name),
            });
        }
        effects.push(Effect::write_file(
            dir.join(relative),
            content.as_bytes().to_vec(),
        ));
    }

    Ok(Effect::Compound(effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_set_requires_object() {
        let err = file_set_effect(Path::new("/out"), "just text").unwrap_err();
        assert!(matches!(err, RenderError::InvalidFileSet { .. }));

        let err = file_set_effect(Path::new("/out"), r#"["a"]"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFileSet { .. }));
    }

    #[test]
    fn test_file_set_rejects_escaping_paths() {
        let err =
            file_set_effect(Path::new("/out"), r#"{"../evil.txt": "x"}"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFileSet { .. }));

        let err = file_set_effect(Path::new("/out"), r#"{"/abs.txt": "x"}"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFileSet { .. }));
    }

    #[test]
    fn test_file_set_sorted_writes() {
        let dir = tempdir().unwrap();
        let effect =
            file_set_effect(dir.path(), r#"{"b.txt": "B", "a.txt": "A"}"#).unwrap();

        match effect {
            Effect::Compound(effects) => {
                assert_eq!(effects.len(), 2);
                match &effects[0] {
                    Effect::WriteFile { path, content, .. } => {
                        assert_eq!(path, &dir.path().join("a.txt"));
                        assert_eq!(content, b"A");
                    }
                    other => panic!("expected write, got {:?}", other),
                }
            }
            other => panic!("expected compound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_module_fails_before_scope_search() {
        let dir = tempdir().unwrap();
        let request = RenderRequest {
            module: dir.path().join("absent.module"),
            expression: None,
            output: dir.path().join("out"),
            project_path: None,
            multi_file: false,
        };

        let store = strata_store::LayeredStore::default();
        let decryptor = crate::mock::StaticDecryptor;
        let err = render_in(
            dir.path(),
            &request,
            &store,
            &decryptor,
            Box::new(crate::mock::MockTransport::new()),
        )
        .unwrap_err();

        assert!(matches!(err, RenderError::ModuleNotFound { .. }));
    }
}
