#![forbid(unsafe_code)]

//! Runtime settings. Values resolve in the order CLI override, process
//! environment, `.env` file, built-in default.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_VIDTUBE_PORT: u16 = 8000;
pub const DEFAULT_VIDTUBE_HOST: &str = "127.0.0.1";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 512;

const DATABASE_FILE: &str = "vidtube.db";
const ASSETS_SUBDIR: &str = "assets";
const UPLOADS_SUBDIR: &str = "uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_root: PathBuf,
    pub port: u16,
    pub host: String,
    /// Base used when building asset references, without trailing slash.
    pub public_url: String,
    pub max_upload_bytes: usize,
}

impl RuntimeConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_root.join(DATABASE_FILE)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_root.join(ASSETS_SUBDIR)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_root.join(UPLOADS_SUBDIR)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub public_url: Option<String>,
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
    let data_root = overrides
        .data_root
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("DATA_ROOT", file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("DATA_ROOT not set"))?;
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("VIDTUBE_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_VIDTUBE_PORT);
    let host = non_blank(overrides.host)
        .or_else(|| non_blank(lookup_value("VIDTUBE_HOST", file_vars, &env_lookup)))
        .unwrap_or_else(|| DEFAULT_VIDTUBE_HOST.to_string());
    let public_url = non_blank(overrides.public_url)
        .or_else(|| non_blank(lookup_value("PUBLIC_URL", file_vars, &env_lookup)))
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://{host}:{port}"));
    let max_upload_mb = lookup_value("MAX_UPLOAD_MB", file_vars, &env_lookup)
        .map(|value| {
            value
                .parse::<u64>()
                .with_context(|| format!("MAX_UPLOAD_MB must be a whole number, got {value:?}"))
        })
        .transpose()?
        .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
    let max_upload_bytes = usize::try_from(max_upload_mb.saturating_mul(1024 * 1024))
        .unwrap_or(usize::MAX);

    Ok(RuntimeConfig {
        data_root: PathBuf::from(data_root),
        port,
        host,
        public_url,
        max_upload_bytes,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
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

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

/// Parses a dotenv-style file. A missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
