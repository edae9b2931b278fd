#![forbid(unsafe_code)]

//! Runtime configuration for the relay backend.
//!
//! Values resolve in layers: CLI override > process environment > `.env` file
//! > built-in default. The two settings without a sane default (admin password
//! and the extractor endpoint) abort startup when absent.

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DB_FILE: &str = "vidgate.db";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SEED_KEY: &str = "bootstrap";
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10;

/// Fully resolved configuration consumed by the backend binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_password: String,
    pub seed_key: String,
    /// Extraction-service endpoint template; `{}` is replaced with the
    /// percent-encoded target URL.
    pub extractor_url: String,
    /// Externally reachable base URL of this deployment. The liveness pinger
    /// only runs when this is set.
    pub public_url: Option<String>,
    pub ping_interval: Duration,
}

/// Values the binary may force regardless of environment, e.g. from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub db_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config(&file_vars, env_var_string, overrides)
}

fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let lookup = |key: &str| env_lookup(key).or_else(|| file_vars.get(key).cloned());

    let db_path = overrides
        .db_path
        .or_else(|| lookup("VIDGATE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
    let host = overrides
        .host
        .or_else(|| lookup("VIDGATE_HOST"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match overrides.port {
        Some(port) => port,
        None => match lookup("VIDGATE_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("VIDGATE_PORT is not a valid port: {raw:?}"))?,
            None => DEFAULT_PORT,
        },
    };

    let admin_password = lookup("VIDGATE_ADMIN_PASSWORD")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("VIDGATE_ADMIN_PASSWORD not set"))?;

    let extractor_url = lookup("VIDGATE_EXTRACTOR_URL")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("VIDGATE_EXTRACTOR_URL not set"))?;
    if !extractor_url.contains("{}") {
        bail!("VIDGATE_EXTRACTOR_URL must contain a {{}} placeholder for the target URL");
    }

    let seed_key = lookup("VIDGATE_SEED_KEY")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SEED_KEY.to_string());

    let public_url = lookup("VIDGATE_PUBLIC_URL")
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty());

    let ping_interval_secs = match lookup("VIDGATE_PING_INTERVAL") {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("VIDGATE_PING_INTERVAL is not a number of seconds: {raw:?}"))?,
        None => DEFAULT_PING_INTERVAL_SECS,
    };

    Ok(RuntimeConfig {
        db_path,
        host,
        port,
        admin_password,
        seed_key,
        extractor_url,
        public_url,
        ping_interval: Duration::from_secs(ping_interval_secs),
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parses a dotenv-style file. Missing files resolve to an empty map so a bare
/// deployment can configure everything through real environment variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

/// Extracts one `KEY=value` pair, tolerating `export` prefixes, surrounding
/// quotes, comments, and blank lines.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value_raw) = assignment.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value_raw.trim();
    let value = strip_matching_quotes(value, '"')
        .or_else(|| strip_matching_quotes(value, '\''))
        .unwrap_or(value);
    Some((key.to_string(), value.to_string()))
}

fn strip_matching_quotes(value: &str, quote: char) -> Option<&str> {
    value.strip_prefix(quote)?.strip_suffix(quote)
}
