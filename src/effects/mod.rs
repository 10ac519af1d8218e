//! Deferred side effects.
//!
//! Command preparation returns `Effect` values instead of touching the
//! filesystem; the CLI layer applies them once preparation has fully
//! succeeded. Applying a write is idempotent (create-or-truncate with fixed
//! permission bits).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Default permission bits for rendered files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// A deferred side effect.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Write `content` to `path`, creating or truncating it.
    WriteFile {
        path: PathBuf,
        content: Vec<u8>,
        mode: u32,
    },
    /// Print a line to standard output.
    Stdout { message: String },
    /// Do nothing.
    Noop,
    /// Apply every contained effect, aggregating failures.
    Compound(Vec<Effect>),
}

impl Effect {
    /// A file write with the default permission bits.
    pub fn write_file(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self::WriteFile {
            path: path.into(),
            content,
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// A file write with explicit permission bits.
    pub fn write_file_with_mode(path: impl Into<PathBuf>, content: Vec<u8>, mode: u32) -> Self {
        Self::WriteFile {
            path: path.into(),
            content,
            mode,
        }
    }

    /// A standard-output line.
    pub fn stdout(message: impl Into<String>) -> Self {
        Self::Stdout {
            message: message.into(),
        }
    }

    /// Apply the effect.
    pub fn apply(&self) -> Result<(), EffectError> {
        match self {
            Self::WriteFile {
                path,
                content,
                mode,
            } => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).map_err(|source| EffectError::Write {
                            path: path.clone(),
                            source,
                        })?;
                    }
                }
                let mut options = OpenOptions::new();
                options.write(true).create(true).truncate(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    options.mode(*mode);
                }
                #[cfg(not(unix))]
                let _ = mode;
                let mut file = options.open(path).map_err(|source| EffectError::Write {
                    path: path.clone(),
                    source,
                })?;
                file.write_all(content).map_err(|source| EffectError::Write {
                    path: path.clone(),
                    source,
                })?;
                file.flush().map_err(|source| EffectError::Write {
                    path: path.clone(),
                    source,
                })
            }
            Self::Stdout { message } => {
                println!("{}", message);
                Ok(())
            }
            Self::Noop => Ok(()),
            Self::Compound(effects) => invoke(effects),
        }
    }
}

/// Apply a batch of effects.
///
/// Every effect is attempted; failures are collected and reported together
/// rather than aborting the remainder of the batch.
pub fn invoke(effects: &[Effect]) -> Result<(), EffectError> {
    let mut failures = Vec::new();
    for effect in effects {
        if let Err(err) = effect.apply() {
            failures.push(err.to_string());
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EffectError::Multiple { messages: failures })
    }
}

/// Errors raised while applying effects.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} effect(s) failed: {}", messages.len(), messages.join("; "))]
    Multiple { messages: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_file_creates_and_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");

        Effect::write_file(&path, b"first version".to_vec())
            .apply()
            .unwrap();
        Effect::write_file(&path, b"second".to_vec()).apply().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_write_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");

        Effect::write_file(&path, b"x".to_vec()).apply().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_file_mode_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("key");

        Effect::write_file_with_mode(&path, b"secret".to_vec(), 0o600)
            .apply()
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_compound_applies_all_and_aggregates_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.txt");
        // Writing under an existing file as if it were a directory fails.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").unwrap();
        let bad = blocker.join("child.txt");

        let effect = Effect::Compound(vec![
            Effect::write_file(&bad, b"never".to_vec()),
            Effect::write_file(&good, b"written".to_vec()),
        ]);

        let err = effect.apply().unwrap_err();
        assert!(matches!(err, EffectError::Multiple { .. }));
        assert_eq!(fs::read(&good).unwrap(), b"written");
    }

    #[test]
    fn test_noop_and_invoke_empty() {
        Effect::Noop.apply().unwrap();
        invoke(&[]).unwrap();
    }
}
