//! Secret resource handlers.
//!
//! The evaluation engine resolves `scheme://...` references by calling back
//! into the host. Three handlers are registered, one per scheme:
//!
//! - `secret://` looks a dotted key up in the decrypted secrets store,
//! - `secretblob://` decrypts an on-disk file and returns it verbatim,
//! - `secrettar://` decrypts an on-disk archive and returns one member,
//!   addressed by the URI fragment.
//!
//! Handlers are pure functions from URI to bytes. A missing store key is not
//! an error (the configuration language applies its own null handling); a
//! failed decryption is.

use std::io::Read;
use std::path::Path;

use strata_store::{LayeredStore, StoreError};

use crate::secrets::{ContentHint, DecryptError, Decryptor};

/// Scheme of the keyed-lookup handler.
pub const SCHEME_KEYED: &str = "secret";
/// Scheme of the raw-blob handler.
pub const SCHEME_BLOB: &str = "secretblob";
/// Scheme of the archive-member handler.
pub const SCHEME_ARCHIVE: &str = "secrettar";

/// A parsed `scheme://path#fragment` resource address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    pub scheme: String,
    pub path: String,
    pub fragment: Option<String>,
}

impl ResourceUri {
    /// Parse a resource URI of the form `scheme://path#fragment`.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let (scheme, rest) = raw.split_once("://").ok_or_else(|| BridgeError::InvalidUri {
            uri: raw.to_string(),
        })?;
        if scheme.is_empty() {
            return Err(BridgeError::InvalidUri {
                uri: raw.to_string(),
            });
        }
        let (path, fragment) = match rest.split_once('#') {
            Some((path, fragment)) if !fragment.is_empty() => {
                (path.to_string(), Some(fragment.to_string()))
            }
            Some((path, _)) => (path.to_string(), None),
            None => (rest.to_string(), None),
        };
        Ok(Self {
            scheme: scheme.to_string(),
            path,
            fragment,
        })
    }
}

/// A registered secret read-handler.
///
/// The closed set of variants mirrors the three schemes; each resolves a
/// URI to a byte payload through the same entry point so the engine session
/// can dispatch purely on scheme.
pub enum SecretHandler<'a> {
    /// Dotted-key lookup in the decrypted secrets store.
    KeyedLookup { secrets: &'a LayeredStore },
    /// Whole-file decryption of an encrypted blob.
    RawBlob { decryptor: &'a dyn Decryptor },
    /// Member extraction from an encrypted tar archive.
    ArchiveMember { decryptor: &'a dyn Decryptor },
}

impl SecretHandler<'_> {
    /// The URI scheme this handler serves.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::KeyedLookup { .. } => SCHEME_KEYED,
            Self::RawBlob { .. } => SCHEME_BLOB,
            Self::ArchiveMember { .. } => SCHEME_ARCHIVE,
        }
    }

    /// Whether the handler addresses into its payload hierarchically.
    ///
    /// Only the archive-member handler does (via the fragment); none of the
    /// handlers support element listing.
    pub fn hierarchical(&self) -> bool {
        matches!(self, Self::ArchiveMember { .. })
    }

    /// Resolve a URI to its byte payload.
    pub fn resolve(&self, uri: &ResourceUri) -> Result<Vec<u8>, BridgeError> {
        match self {
            Self::KeyedLookup { secrets } => {
                let key = uri.path.trim_start_matches('/').replace('/', ".");
                let subtree = secrets.cut(&key);
                if subtree.is_empty() {
                    Ok(secrets.string(&key).into_bytes())
                } else {
                    Ok(subtree.marshal()?)
                }
            }
            Self::RawBlob { decryptor } => {
                Ok(decryptor.decrypt(Path::new(&uri.path), ContentHint::Binary)?)
            }
            Self::ArchiveMember { decryptor } => {
                let bytes = decryptor.decrypt(Path::new(&uri.path), ContentHint::Binary)?;
                let wanted = uri.fragment.as_deref().unwrap_or("");
                {
                    let mut archive = tar::Archive::new(&bytes[..]);
                    let entries = archive.entries().map_err(|e| BridgeError::Archive {
                        path: uri.path.clone(),
                        message: e.to_string(),
                    })?;
                    for entry in entries {
                        let mut entry = entry.map_err(|e| BridgeError::Archive {
                            path: uri.path.clone(),
                            message: e.to_string(),
                        })?;
                        if entry.path_bytes().as_ref() == wanted.as_bytes() {
                            let mut content = Vec::new();
                            entry.read_to_end(&mut content).map_err(|e| {
                                BridgeError::Archive {
                                    path: uri.path.clone(),
                                    message: e.to_string(),
                                }
                            })?;
                            return Ok(content);
                        }
                    }
                }
                // No member matched: the whole decrypted archive is returned
                // unchanged. Compatibility quirk, relied upon downstream.
                Ok(bytes)
            }
        }
    }
}

/// Errors raised while resolving a secret resource.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid resource URI '{uri}'")]
    InvalidUri { uri: String },

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("failed to read archive {path}: {message}")]
    Archive { path: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
