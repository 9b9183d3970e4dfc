//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (applied on top by the binary)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compress::CompressionLevel;
use crate::error::{ProxyError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Default config file location (`<config_dir>/aip-proxy/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("aip-proxy").join("config.toml"))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields with any `AIP_*` environment variables that are set
    /// and parse cleanly.
    pub fn apply_env(&mut self) {
        if let Ok(target) = std::env::var("AIP_PROXY_TARGET") {
            self.proxy.target = target;
        }
        if let Some(port) = env_parse("AIP_PROXY_PORT") {
            self.proxy.port = port;
        }
        if let Ok(host) = std::env::var("AIP_PROXY_HOST") {
            self.proxy.host = host;
        }
        if let Some(level) = env_parse::<u8>("AIP_COMPRESSION_LEVEL") {
            if let Ok(level) = CompressionLevel::try_from(level) {
                self.compression.level = level;
            }
        }
        if let Ok(val) = std::env::var("AIP_CACHE_ENABLED") {
            match val.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cache.enabled = true,
                "0" | "false" | "no" | "off" => self.cache.enabled = false,
                _ => tracing::warn!("Ignoring invalid AIP_CACHE_ENABLED value: {}", val),
            }
        }
        if let Some(ttl) = env_parse("AIP_CACHE_TTL") {
            self.cache.ttl_secs = ttl;
        }
        if let Some(max) = env_parse("AIP_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = max;
        }
    }

    /// Check values the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.target.trim().is_empty() {
            return Err(ProxyError::Config("target URL must not be empty".to_string()));
        }
        if !(self.proxy.target.starts_with("http://") || self.proxy.target.starts_with("https://"))
        {
            return Err(ProxyError::Config(format!(
                "target URL must start with http:// or https://, got {}",
                self.proxy.target
            )));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ProxyError::Config(
                "cache max_entries must be at least 1 when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Proxy server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Target API base URL (e.g., https://api.openai.com/v1)
    pub target: String,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// End-to-end upstream timeout in seconds (connect through final byte)
    pub timeout_secs: u64,

    /// Enable verbose logging
    pub verbose: bool,

    /// Maximum inbound request body size in bytes
    pub max_body_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: "https://api.openai.com/v1".to_string(),
            port: 8090,
            host: "127.0.0.1".to_string(),
            timeout_secs: 300,
            verbose: false,
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl ProxyConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Target URL without trailing slashes
    pub fn target_base(&self) -> &str {
        self.target.trim_end_matches('/')
    }
}

/// Compression configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compression level: 0=off, 1=light, 2=balanced, 3=aggressive
    pub level: CompressionLevel,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching
    pub enabled: bool,

    /// Entry time-to-live in seconds
    pub ttl_secs: u64,

    /// Maximum number of cached responses
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.proxy.port, 8090);
        assert_eq!(config.proxy.target, "https://api.openai.com/v1");
        assert_eq!(config.compression.level, CompressionLevel::Balanced);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 200);
    }

    #[test]
    fn test_proxy_listen_addr() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8090");
    }

    #[test]
    fn test_target_base_trims_slashes() {
        let config = ProxyConfig {
            target: "http://localhost:9000/v1//".to_string(),
            ..Default::default()
        };
        assert_eq!(config.target_base(), "http://localhost:9000/v1");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [proxy]
            target = "https://generativelanguage.googleapis.com"
            port = 9090

            [compression]
            level = 3

            [cache]
            enabled = false
            ttl_secs = 60
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.proxy.target, "https://generativelanguage.googleapis.com");
        assert_eq!(config.proxy.port, 9090);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert_eq!(config.compression.level, CompressionLevel::Aggressive);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, 200);
    }

    #[test]
    fn test_config_rejects_bad_level() {
        let result: std::result::Result<Config, _> = toml::from_str("[compression]\nlevel = 7\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[proxy]\ntarget = \"http://localhost:1234\"\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.proxy.target, "http://localhost:1234");
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }

    #[test]
    fn test_config_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[proxy\ntarget = ").unwrap();

        match Config::from_file(file.path()).unwrap_err() {
            ProxyError::Config(msg) => assert!(msg.starts_with("Failed to parse config")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.proxy.target = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.proxy.target = "http://example.com".to_string();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }
}
