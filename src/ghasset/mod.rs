//! Release asset lookup.
//!
//! Queries the latest release of a GitHub repository, selects one asset by
//! name pattern and optionally resolves its checksum from a checksums asset
//! shipped with the same release. Results render as dotenv-style lines for
//! downstream scripting.

use regex_lite::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// GitHub API base URL.
const API_BASE: &str = "https://api.github.com";

/// User-Agent header required by the GitHub API.
const USER_AGENT: &str = "strata-cli";

/// One release asset query.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetQuery {
    pub owner: String,
    pub repo: String,
    /// Pattern matched against asset names; the first match wins.
    pub pattern: String,
    /// Pattern selecting the checksums asset, when the release ships one.
    #[serde(default)]
    pub checksums_pattern: Option<String>,
}

/// A resolved release asset.
#[derive(Debug, Clone)]
pub struct AssetResult {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub url: String,
    pub hash: Option<String>,
}

/// Latest-release response (only the fields we read).
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    url: String,
}

/// Errors raised while resolving release assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("GitHub request failed: {0}")]
    Http(String),

    #[error("failed to parse GitHub response: {0}")]
    Parse(String),

    #[error("invalid asset pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("no asset matched pattern '{pattern}'")]
    NoMatch { pattern: String },

    #[error("invalid queries file: {0}")]
    Queries(String),
}

/// Resolve `query` against the latest release of its repository.
pub fn fetch_latest(token: &str, query: &AssetQuery) -> Result<AssetResult, AssetError> {
    let url = format!(
        "{}/repos/{}/{}/releases/latest",
        API_BASE, query.owner, query.repo
    );
    let release: Release = authorized(ureq::get(&url), token)
        .set("Accept", "application/vnd.github+json")
        .call()
        .map_err(|e| AssetError::Http(e.to_string()))?
        .into_json()
        .map_err(|e| AssetError::Parse(e.to_string()))?;

    let asset = select_asset(&release.assets, &query.pattern)?.ok_or_else(|| {
        AssetError::NoMatch {
            pattern: query.pattern.clone(),
        }
    })?;

    let hash = match &query.checksums_pattern {
        None => None,
        Some(pattern) => {
            let checksums = select_asset(&release.assets, pattern)?.ok_or_else(|| {
                AssetError::NoMatch {
                    pattern: pattern.clone(),
                }
            })?;
            let body = authorized(ureq::get(&checksums.url), token)
                .set("Accept", "application/octet-stream")
                .call()
                .map_err(|e| AssetError::Http(e.to_string()))?
                .into_string()
                .map_err(|e| AssetError::Parse(e.to_string()))?;
            checksum_for(&body, &asset.name)
        }
    };

    Ok(AssetResult {
        owner: query.owner.clone(),
        repo: query.repo.clone(),
        tag: release.tag_name,
        url: asset.url.clone(),
        hash,
    })
}

/// Parse a TOML queries file holding a `[[queries]]` table array.
pub fn parse_queries(text: &str) -> Result<Vec<AssetQuery>, AssetError> {
    #[derive(Deserialize)]
    struct QueryFile {
        queries: Vec<AssetQuery>,
    }

    let file: QueryFile = toml::from_str(text).map_err(|e| AssetError::Queries(e.to_string()))?;
    Ok(file.queries)
}

/// Render results as dotenv lines, prefixed per repository.
///
/// `octo/my-repo` at tag v1 becomes `OCTO_MY_REPO_TAG=v1` and so on; any
/// non-alphanumeric character in the prefix turns into `_`.
pub fn dotenv_lines(results: &[AssetResult]) -> String {
    let mut out = String::new();
    for result in results {
        let prefix: String = format!("{}_{}_", result.owner, result.repo)
            .to_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        out.push_str(&format!("{}TAG={}\n", prefix, result.tag));
        out.push_str(&format!("{}URL={}\n", prefix, result.url));
        if let Some(hash) = &result.hash {
            out.push_str(&format!("{}HASH={}\n", prefix, hash));
        }
    }
    out
}

/// Whether `bytes` hash to `expected` (hex SHA-256, case-insensitive).
pub fn matches_checksum(bytes: &[u8], expected: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize()).eq_ignore_ascii_case(expected.trim())
}

fn authorized(request: ureq::Request, token: &str) -> ureq::Request {
    let request = request
        .set("User-Agent", USER_AGENT)
        .set("X-GitHub-Api-Version", "2022-11-28");
    if token.is_empty() {
        request
    } else {
        request.set("Authorization", &format!("Bearer {}", token))
    }
}

/// First asset whose name matches `pattern`.
fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    pattern: &str,
) -> Result<Option<&'a ReleaseAsset>, AssetError> {
    let regex = Regex::new(pattern).map_err(|e| AssetError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    Ok(assets.iter().find(|asset| regex.is_match(&asset.name)))
}

/// Scan `<hash> <filename>` checksum lines for `asset_name`.
fn checksum_for(lines: &str, asset_name: &str) -> Option<String> {
    for line in lines.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(hash), Some(name)) = (parts.next(), parts.next()) {
            if name.contains(asset_name) {
                return Some(hash.to_string());
            }
        }
    }
    None
}
