//! Configuration file parser for ~/.config/gracile/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! most likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::net::DEFAULT_USER_AGENT;
use crate::pipeline::MAX_SCRAPE_CONCURRENCY;
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the article cache. Defaults to
    /// `articles.db` next to the config file.
    pub database_path: Option<PathBuf>,

    pub feed_timeout_secs: u64,

    pub scrape_timeout_secs: u64,

    /// Pages scraped at once per feed. Clamped to 1..=16.
    pub scrape_concurrency: usize,

    /// Articles per run when `--max` is not given. -1 = unbounded.
    pub default_max_articles: i64,

    /// Overall budget for scraping one feed's pages. Pages still loading
    /// when it runs out are skipped and their entries use feed data only.
    pub batch_deadline_secs: Option<u64>,

    pub user_agent: String,

    pub max_feed_bytes: usize,

    pub max_page_bytes: usize,

    /// Permit loopback and private-network hosts in feed and page URLs.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            feed_timeout_secs: 30,
            scrape_timeout_secs: 20,
            scrape_concurrency: 4,
            default_max_articles: -1,
            batch_deadline_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_feed_bytes: 10 * 1024 * 1024,
            max_page_bytes: 5 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "feed_timeout_secs",
        "scrape_timeout_secs",
        "scrape_concurrency",
        "default_max_articles",
        "batch_deadline_secs",
        "user_agent",
        "max_feed_bytes",
        "max_page_bytes",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a corrupted file cannot exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            concurrency = config.scrape_concurrency(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs.max(1))
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs.max(1))
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_secs.map(Duration::from_secs)
    }

    pub fn scrape_concurrency(&self) -> usize {
        self.scrape_concurrency.clamp(1, MAX_SCRAPE_CONCURRENCY)
    }

    pub fn host_policy(&self) -> HostPolicy {
        HostPolicy::from_allow_private(self.allow_private_hosts)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("gracile_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.feed_timeout(), Duration::from_secs(30));
        assert_eq!(config.scrape_timeout(), Duration::from_secs(20));
        assert_eq!(config.scrape_concurrency(), 4);
        assert_eq!(config.default_max_articles, -1);
        assert_eq!(config.batch_deadline(), None);
        assert!(config.user_agent.starts_with("gracile/"));
        assert_eq!(config.max_feed_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_page_bytes, 5 * 1024 * 1024);
        assert_eq!(config.host_policy(), HostPolicy::Public);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gracile_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.default_max_articles, -1);
    }

    #[test]
    fn test_empty_and_whitespace_files_return_default() {
        for (name, content) in [("empty", ""), ("whitespace", "   \n  \n  ")] {
            let (dir, path) = write_config(name, content);
            let config = Config::load(&path).unwrap();
            assert_eq!(config.scrape_concurrency, 4);
            std::fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "scrape_concurrency = 8\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.scrape_concurrency(), 8);
        assert_eq!(config.feed_timeout_secs, 30);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
database_path = "/var/lib/gracile/cache.db"
feed_timeout_secs = 10
scrape_timeout_secs = 5
scrape_concurrency = 6
default_max_articles = 20
batch_deadline_secs = 60
user_agent = "custom-agent/1.0"
max_feed_bytes = 1024
max_page_bytes = 2048
allow_private_hosts = true
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/gracile/cache.db"))
        );
        assert_eq!(config.feed_timeout(), Duration::from_secs(10));
        assert_eq!(config.scrape_timeout(), Duration::from_secs(5));
        assert_eq!(config.scrape_concurrency(), 6);
        assert_eq!(config.default_max_articles, 20);
        assert_eq!(config.batch_deadline(), Some(Duration::from_secs(60)));
        assert_eq!(config.user_agent, "custom-agent/1.0");
        assert_eq!(config.max_feed_bytes, 1024);
        assert_eq!(config.max_page_bytes, 2048);
        assert_eq!(config.host_policy(), HostPolicy::AllowPrivate);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_concurrency_clamped() {
        let config = Config {
            scrape_concurrency: 0,
            ..Config::default()
        };
        assert_eq!(config.scrape_concurrency(), 1);
        let config = Config {
            scrape_concurrency: 500,
            ..Config::default()
        };
        assert_eq!(config.scrape_concurrency(), 16);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = "scrape_concurrency = 2\ntheme = \"dark\"\nanother_unknown = 42\n";
        let (dir, path) = write_config("unknown", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.scrape_concurrency, 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "feed_timeout_secs = \"soon\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
