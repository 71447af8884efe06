//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file, and a handful of environment variables (which `.env` may set).
//! Unknown keys in the file are rejected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use atelier_comfy_client::SlotBindings;
use atelier_directory_watcher::{WatchTarget, WatchTimings};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ATELIER_CONFIG";

/// Load `.env` (or `path`) into the process environment.
///
/// A missing file is not an error; a malformed one is.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    match loaded {
        Err(err) if !err.not_found() => Err(err.into()),
        _ => Ok(()),
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Static assets served at `/`.
    pub static_dir: PathBuf,

    /// HTTP listener.
    pub server: ServerConfig,

    /// Prompt expansion backend.
    pub ollama: OllamaConfig,

    /// Image-synthesis backend.
    pub comfy: ComfyConfig,

    /// Where generated images land and how to wait for them.
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            server: ServerConfig::default(),
            ollama: OllamaConfig::default(),
            comfy: ComfyConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OllamaConfig {
    /// Server root, without `/api/generate`.
    pub base_url: String,

    /// Model used to expand concepts.
    pub model: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Cap on tokens generated per expansion.
    pub max_tokens: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: atelier_ollama::DEFAULT_BASE_URL.to_string(),
            model: atelier_ollama::DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            max_tokens: atelier_ollama::DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComfyConfig {
    /// Server root; `/prompt` is appended.
    pub base_url: String,

    /// Workflow template in API format.
    pub workflow: PathBuf,

    /// Which node inputs receive the prompt, negative prompt, seed, etc.
    pub slots: SlotBindings,
}

impl Default for ComfyConfig {
    fn default() -> Self {
        Self {
            base_url: atelier_comfy_client::client::DEFAULT_BASE_URL.to_string(),
            workflow: PathBuf::from("workflows/base_workflow.json"),
            slots: SlotBindings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory the backend saves images into.
    pub dir: PathBuf,

    /// File-name glob an output must match.
    pub pattern: String,

    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let timings = WatchTimings::default();
        Self {
            dir: PathBuf::from("output"),
            pattern: "generated_image_*.png".to_string(),
            poll_interval_ms: millis(timings.poll_interval),
            settle_delay_ms: millis(timings.settle_delay),
            timeout_secs: timings.timeout.as_secs(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl OutputConfig {
    pub fn watch_target(&self) -> WatchTarget {
        WatchTarget::new(&self.dir).with_glob(&self.pattern)
    }

    pub fn watch_timings(&self) -> WatchTimings {
        WatchTimings::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.settle_delay_ms),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply the recognized environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OLLAMA_API") {
            // Older setups point at the full endpoint.
            self.ollama.base_url = url
                .trim_end_matches('/')
                .trim_end_matches("/api/generate")
                .to_string();
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama.model = model;
        }
        if let Some(url) = lookup("COMFY_API") {
            self.comfy.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(workflow) = lookup("COMFY_WORKFLOW") {
            self.comfy.workflow = PathBuf::from(workflow);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.output.watch_timings().validate()?;
        self.output.watch_target().rule.validate()?;
        if self.ollama.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ollama.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.comfy.base_url, "http://127.0.0.1:8188");
        assert_eq!(config.output.pattern, "generated_image_*.png");
        assert_eq!(config.output.watch_timings(), WatchTimings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            static_dir = "web"

            [output]
            dir = "/srv/comfy/output"
            settle_delay_ms = 250

            [comfy.slots]
            positive = { node = "10", input = "text" }
            negative = { node = "11", input = "text" }
            seed = { node = "12", input = "noise_seed" }
            "#,
        )
        .unwrap();

        assert_eq!(config.static_dir, PathBuf::from("web"));
        assert_eq!(config.output.dir, PathBuf::from("/srv/comfy/output"));
        assert_eq!(config.output.settle_delay_ms, 250);
        assert_eq!(config.output.poll_interval_ms, 500);
        assert_eq!(config.comfy.slots.seed.input, "noise_seed");
        assert_eq!(config.comfy.slots.steps, None);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = AppConfig::from_toml_str("[output]\npoll_ms = 10\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_API", "http://gpu-box:11434/api/generate"),
            ("OLLAMA_MODEL", "llama3.2"),
            ("COMFY_API", "http://gpu-box:8188/"),
            ("OUTPUT_DIR", "static/outputs"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.comfy.base_url, "http://gpu-box:8188");
        assert_eq!(config.output.dir, PathBuf::from("static/outputs"));
        assert_eq!(config.comfy.workflow, ComfyConfig::default().workflow);
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let mut config = AppConfig::default();
        config.output.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Watcher(_))));
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let config = AppConfig::from_toml_str(
            "[output]\ntimeout_secs = 9223372036854775807\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Watcher(_))));
    }

    #[test]
    fn test_default_timings_round_trip() {
        let output = OutputConfig::default();
        assert_eq!(output.poll_interval_ms, 500);
        assert_eq!(output.settle_delay_ms, 1000);
        assert_eq!(output.watch_timings(), WatchTimings::default());
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_ollama_max_tokens() {
        let config = AppConfig::from_toml_str("[ollama]\nmax_tokens = 512\n").unwrap();
        assert_eq!(config.ollama.max_tokens, 512);
        assert_eq!(
            AppConfig::default().ollama.max_tokens,
            atelier_ollama::DEFAULT_MAX_TOKENS
        );
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(load_env_file(Some(&temp_dir.path().join(".env"))).is_ok());
    }

    #[test]
    fn test_malformed_env_file_is_reported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let env_file = temp_dir.path().join(".env");
        std::fs::write(&env_file, "ATELIER_TEST_BROKEN LINE WITHOUT EQUALS\n").unwrap();

        let result = load_env_file(Some(&env_file));
        assert!(matches!(result, Err(ConfigError::EnvFile(_))));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let mut config = AppConfig::default();
        config.output.pattern = "[oops".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Watcher(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
