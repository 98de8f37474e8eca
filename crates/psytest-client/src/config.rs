//! Client configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Connection settings for the assessment API.
///
/// Note: Custom Debug impl masks the API key to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Where local session mirrors live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Top-level psytest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsytestConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Countdown refresh period of the terminal driver.
    #[serde(default = "default_tick")]
    pub tick_interval_ms: u64,
}

impl Default for PsytestConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            tick_interval_ms: default_tick(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_storage_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share").join("psytest"),
        Err(_) => PathBuf::from(".psytest"),
    }
}
fn default_tick() -> u64 {
    1000
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + len];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + len + 1..]);
    }
    result
}

/// Apply `PSYTEST_*` overrides using `lookup` to read variables.
fn apply_overrides(config: &mut PsytestConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("PSYTEST_API_URL") {
        config.api.base_url = url;
    }
    if let Some(key) = lookup("PSYTEST_API_KEY") {
        config.api.api_key = Some(key);
    }
    if let Some(dir) = lookup("PSYTEST_STORAGE_DIR") {
        config.storage.dir = PathBuf::from(dir);
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `psytest.toml` in the current directory
/// 2. `~/.config/psytest/config.toml`
///
/// Environment variable overrides: `PSYTEST_API_URL`, `PSYTEST_API_KEY`,
/// `PSYTEST_STORAGE_DIR`.
pub fn load_config() -> Result<PsytestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PsytestConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("psytest.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "config loaded");
            config
        }
        None => PsytestConfig::default(),
    };

    apply_overrides(&mut config, |k| std::env::var(k).ok());
    Ok(config)
}

/// Parse a TOML config string and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<PsytestConfig> {
    let mut config: PsytestConfig = toml::from_str(content)?;
    config.api.base_url = resolve_env_vars(&config.api.base_url);
    config.api.api_key = config.api.api_key.as_deref().map(resolve_env_vars);
    config.storage.dir = PathBuf::from(resolve_env_vars(&config.storage.dir.to_string_lossy()));
    anyhow::ensure!(config.tick_interval_ms > 0, "tick_interval_ms must be positive");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("psytest"))
}

/// Starter config written by `psytest init`.
pub const STARTER_CONFIG: &str = r#"# psytest configuration

tick_interval_ms = 1000

[api]
base_url = "http://localhost:8000"
# api_key = "${PSYTEST_API_KEY}"
timeout_secs = 30

[storage]
dir = ".psytest"
"#;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PSYTEST_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PSYTEST_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PSYTEST_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_PSYTEST_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PsytestConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
tick_interval_ms = 500

[api]
base_url = "https://assess.example.com"
api_key = "secret"
timeout_secs = 10

[storage]
dir = "/tmp/psytest"
"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://assess.example.com");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/psytest"));
        assert_eq!(config.tick_interval_ms, 500);
    }

    #[test]
    fn parse_empty_config_uses_field_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert!(config.api.api_key.is_none());
    }

    #[test]
    fn starter_config_parses() {
        let config = parse_config(STARTER_CONFIG).unwrap();
        assert_eq!(config.storage.dir, PathBuf::from(".psytest"));
    }

    #[test]
    fn zero_tick_rejected() {
        assert!(parse_config("tick_interval_ms = 0").is_err());
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("PSYTEST_API_URL", "http://override:9000"),
            ("PSYTEST_STORAGE_DIR", "/var/lib/psytest"),
        ]
        .into_iter()
        .collect();

        let mut config = parse_config("").unwrap();
        apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.api.base_url, "http://override:9000");
        assert_eq!(config.storage.dir, PathBuf::from("/var/lib/psytest"));
        assert!(config.api.api_key.is_none());
    }

    #[test]
    fn debug_masks_api_key() {
        let api = ApiConfig {
            api_key: Some("sk-very-secret".into()),
            ..ApiConfig::default()
        };
        let debug = format!("{api:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn missing_explicit_config_is_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/psytest.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
