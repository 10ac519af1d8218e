//! Decryption seam for encrypted secret files.
//!
//! Decryption itself is an external operation: the production implementation
//! shells out to `sops`, and the render path only ever sees opaque decrypted
//! bytes. The trait keeps the render pipeline testable without any
//! encryption tooling on the host.

use std::path::{Path, PathBuf};
use std::process::Command;

/// How an encrypted file's payload should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    /// Opaque binary payload, returned verbatim.
    Binary,
    /// Structured key-value document, emitted as JSON.
    Structured,
}

/// External decrypt operation keyed by file path and content-type hint.
pub trait Decryptor {
    fn decrypt(&self, path: &Path, hint: ContentHint) -> Result<Vec<u8>, DecryptError>;
}

/// Decryptor backed by the `sops` command-line tool.
#[derive(Debug, Clone)]
pub struct SopsCli {
    program: String,
}

impl SopsCli {
    pub fn new() -> Self {
        Self {
            program: "sops".to_string(),
        }
    }

    /// Use a different executable (e.g. an absolute path).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SopsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl Decryptor for SopsCli {
    fn decrypt(&self, path: &Path, hint: ContentHint) -> Result<Vec<u8>, DecryptError> {
        let mut command = Command::new(&self.program);
        command.arg("--decrypt");
        match hint {
            ContentHint::Binary => {
                command.args(["--input-type", "binary", "--output-type", "binary"]);
            }
            ContentHint::Structured => {
                command.args(["--output-type", "json"]);
            }
        }
        command.arg(path);

        let output = command.output().map_err(|source| DecryptError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(DecryptError::CommandFailed {
                path: path.to_path_buf(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Errors raised by the external decrypt operation.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("decryption of {} failed: {stderr}", path.display())]
    CommandFailed {
        path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
