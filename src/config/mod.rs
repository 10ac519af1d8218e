//! Bootstrap configuration and secrets loading.
//!
//! The CLI assembles two layered stores during startup: the plain
//! configuration (config files first, then the `STRATA` environment
//! namespace) and the decrypted secrets named by the configuration. Both
//! stores merge strictly and are read-only once loading completes.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use strata_store::{Format, LayeredStore, StoreError};

use crate::secrets::{ContentHint, DecryptError, Decryptor};

/// Environment namespace merged over the file layers.
pub const ENV_PREFIX: &str = "STRATA";

/// Per-directory config file name checked before the user-level config.
pub const LOCAL_CONFIG_FILE: &str = ".strata.toml";

/// Config key naming the encrypted secrets file for the root command.
pub const SECRETS_KEY: &str = "commands.root.secrets";

const DEFAULT_CONFIG: &str =
    "# strata configuration\n\n[commands.root]\n# secrets = \"/path/to/secrets.enc.json\"\n";

/// Where one layer of the bootstrap configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    Env,
}

/// A contributing configuration source with provenance.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,
    /// File path, or the namespace prefix for environment layers.
    pub name: String,
    /// SHA-256 of the raw file bytes (file layers only).
    pub digest: Option<String>,
}

/// Parameters for [`load_config`].
#[derive(Debug, Clone)]
pub struct LoadConfigParams {
    pub env_prefixes: Vec<String>,
    pub config_paths: Vec<PathBuf>,
}

impl Default for LoadConfigParams {
    fn default() -> Self {
        Self {
            env_prefixes: vec![ENV_PREFIX.to_string()],
            config_paths: Vec::new(),
        }
    }
}

/// Errors raised during the loading phase.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("cannot locate a configuration directory: neither XDG_CONFIG_HOME nor HOME is set")]
    NoConfigDir,
}

/// Load the plain configuration into `store`.
///
/// File layers merge first, then each environment namespace, so environment
/// variables win over files on same-shape keys; a shape conflict under
/// strict merging is an error either way. Returns the contributing sources
/// in merge order.
pub fn load_config(
    params: &LoadConfigParams,
    store: &mut LayeredStore,
) -> Result<Vec<ConfigSource>, ConfigError> {
    let mut sources = Vec::new();

    for path in &params.config_paths {
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        store.load(&bytes, Format::Toml)?;
        sources.push(ConfigSource {
            origin: ConfigOrigin::File,
            name: path.display().to_string(),
            digest: Some(digest),
        });
    }

    for prefix in &params.env_prefixes {
        store.load_env(prefix, '_')?;
        sources.push(ConfigSource {
            origin: ConfigOrigin::Env,
            name: prefix.clone(),
            digest: None,
        });
    }

    Ok(sources)
}

/// Decrypt and merge each secrets file into `store`.
///
/// Structured payloads come back from the decryptor as JSON and merge under
/// the same strict rules as plain configuration.
pub fn load_secrets(
    paths: &[PathBuf],
    decryptor: &dyn Decryptor,
    store: &mut LayeredStore,
) -> Result<(), ConfigError> {
    for path in paths {
        let bytes = decryptor.decrypt(path, ContentHint::Structured)?;
        store.load(&bytes, Format::Json)?;
    }
    Ok(())
}

/// Render every secret as an environment variable assignment.
///
/// The dotted key joins the prefix with `_` and is upper-cased:
/// `db.pass` with prefix `TF_VAR` becomes `TF_VAR_DB_PASS`.
pub fn secrets_to_env(secrets: &LayeredStore, prefix: &str) -> Vec<(String, String)> {
    secrets
        .keys()
        .into_iter()
        .map(|key| {
            let name = format!("{}_{}", prefix, key.replace('.', "_")).to_uppercase();
            let value = secrets.string(&key);
            (name, value)
        })
        .collect()
}

/// Locate the bootstrap config file.
///
/// `./.strata.toml` wins when present; otherwise the user-level
/// `strata/config.toml` under `$XDG_CONFIG_HOME` (or `~/.config`) is used
/// and created with a commented default on first run.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(local.to_path_buf());
    }

    let config_dir = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => match std::env::var("HOME") {
            Ok(home) if !home.is_empty() => PathBuf::from(home).join(".config"),
            _ => return Err(ConfigError::NoConfigDir),
        },
    };

    let path = config_dir.join("strata/config.toml");
    if !path.is_file() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(&path, DEFAULT_CONFIG).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}
