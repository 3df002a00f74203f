//! Server configuration.
//!
//! Loaded from a TOML file whose every section is optional, then
//! overridden by environment variables and CLI flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use neurorag_llm::{GenerationConfig, LlmConfig};
use neurorag_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const BIND_ADDR_ENV: &str = "NEURORAG_BIND_ADDR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub memory: MemoryConfig,
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory for in-flight uploads.
    pub temp_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            temp_dir: PathBuf::from("./data/temp"),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Warns if the file carries an LLM API key.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        if config.llm.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (GEMINI_API_KEY, OPENAI_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Apply `NEURORAG_BIND_ADDR` and the provider API key variable.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(BIND_ADDR_ENV) {
            self.server.bind = bind;
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = self
                .llm
                .api_key_env()
                .and_then(|name| lookup(name))
                .filter(|key| !key.is_empty());
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.bind, self.server.port).parse()?;
        Ok(addr)
    }
}

/// Reject config files that are not regular files or are world-writable.
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!("Config path '{}' is not a regular file.", path.display());
    }

    let permission_bits = metadata.permissions().mode() & 0o777;
    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.memory.default_top_k, 5);
        assert_eq!(config.memory.context_token_budget, 1500);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.generation.top_k, 40);
    }

    #[test]
    fn sections_override_defaults() {
        let toml_str = r#"
[server]
port = 9000

[memory]
data_dir = "/var/lib/neurorag"
recency_decay = 0.9

[llm]
provider = "openai"
model = "gpt-4o-mini"

[generation]
timeout_ms = 5000
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.memory.data_dir, PathBuf::from("/var/lib/neurorag"));
        assert!((config.memory.recency_decay - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.memory.eviction_threshold, 0.2);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.generation.timeout_ms, 5000);
        assert_eq!(config.generation.max_output_tokens, 2048);
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 8123").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 8123);
    }

    #[test]
    fn from_file_missing_path_fails() {
        assert!(AppConfig::from_file("/nonexistent/neurorag.toml").is_err());
    }

    #[test]
    fn env_overrides_bind_and_key() {
        let env: HashMap<&str, &str> = [
            ("NEURORAG_BIND_ADDR", "0.0.0.0"),
            ("GEMINI_API_KEY", "env-key"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env_with(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.llm.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn config_file_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("file-key".to_string());
        config.apply_env_with(|name| (name == "GEMINI_API_KEY").then(|| "env-key".to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn socket_addr_parses() {
        let config = AppConfig::default();
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8000");

        let mut bad = AppConfig::default();
        bad.server.bind = "not an address".to_string();
        assert!(bad.socket_addr().is_err());
    }
}
