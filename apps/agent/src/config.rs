//! Agent server configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cadence_shared_config::{parse_env, CommonConfig, DatabaseConfig, Environment, OllamaConfig};
use url::Url;

use crate::services::tools::{DEFAULT_PLAYLIST_URL, DEFAULT_VIDEO_SEARCH_URL};
use crate::services::DEFAULT_MAX_ROUNDS;

/// Where catalog embeddings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            other => Err(format!("expected 'ollama' or 'hashing', got '{}'", other)),
        }
    }
}

/// Where conversations are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

/// How tool side effects reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserMode {
    /// Launch the desktop browser
    System,
    /// Only log the URLs
    Log,
}

impl FromStr for BrowserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "log" => Ok(Self::Log),
            other => Err(format!("expected 'system' or 'log', got '{}'", other)),
        }
    }
}

/// Agent server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database, Ollama and environment settings
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Playlist catalog JSON file
    pub catalog_path: PathBuf,

    pub embedding_backend: EmbeddingBackend,

    pub store_backend: StoreBackend,

    pub browser_mode: BrowserMode,

    /// Tool dispatch rounds allowed per run
    pub max_rounds: usize,

    pub model_timeout_secs: u64,

    pub tool_timeout_secs: u64,

    /// Default session listing size
    pub session_list_limit: i64,

    /// Search results page; the query goes in `search_query`
    pub video_search_url: Url,

    /// Playlist page; the catalog id goes in `list`
    pub playlist_url: Url,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production, `DATABASE_URL` must be set explicitly when conversations
    /// are stored in PostgreSQL.
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow!("Failed to load config: {}", e))?;

        let store_backend = parse_var("STORE_BACKEND", StoreBackend::Postgres)?;

        if common.environment.is_production() && store_backend == StoreBackend::Postgres {
            Self::validate_database_url()?;
        }

        let max_rounds: usize = parse_env("AGENT_MAX_ROUNDS", DEFAULT_MAX_ROUNDS)?;
        if max_rounds == 0 {
            bail!("AGENT_MAX_ROUNDS must be at least 1");
        }

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "playlist.json".to_string())
                .into(),

            embedding_backend: parse_var("EMBEDDING_BACKEND", EmbeddingBackend::Ollama)?,

            store_backend,

            browser_mode: parse_var("BROWSER_MODE", BrowserMode::System)?,

            max_rounds,

            model_timeout_secs: parse_env("MODEL_TIMEOUT_SECS", 120)?,

            tool_timeout_secs: parse_env("TOOL_TIMEOUT_SECS", 15)?,

            session_list_limit: parse_env("SESSION_LIST_LIMIT", 20)?,

            video_search_url: Self::load_url("VIDEO_SEARCH_URL", DEFAULT_VIDEO_SEARCH_URL)?,

            playlist_url: Self::load_url("PLAYLIST_URL", DEFAULT_PLAYLIST_URL)?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    /// Validate that DATABASE_URL is explicitly set
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string or use STORE_BACKEND=memory."
                );
            }
        }
    }

    fn load_url(name: &str, default: &str) -> Result<Url> {
        let raw = env::var(name).unwrap_or_else(|_| default.to_string());
        let url = Url::parse(&raw).with_context(|| format!("Invalid {} value '{}'", name, raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("{} must be an http(s) URL, got '{}'", name, raw);
        }
        Ok(url)
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Ollama configuration
    pub fn ollama(&self) -> &OllamaConfig {
        &self.common.ollama
    }

    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Parse an enum-valued variable, rejecting unknown values
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr<Err = String>,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: String| anyhow!("Invalid {} value: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests that modify environment variables don't run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to temporarily set environment variables for a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(set: &[(&str, &str)], remove: &[&str]) -> Self {
            let mut vars = Vec::new();
            for (k, v) in set {
                vars.push((k.to_string(), env::var(k).ok()));
                env::set_var(k, v);
            }
            for k in remove {
                vars.push((k.to_string(), env::var(k).ok()));
                env::remove_var(k);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in self.vars.iter().rev() {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    const AGENT_VARS: &[&str] = &[
        "PORT",
        "CATALOG_PATH",
        "EMBEDDING_BACKEND",
        "STORE_BACKEND",
        "BROWSER_MODE",
        "AGENT_MAX_ROUNDS",
        "MODEL_TIMEOUT_SECS",
        "TOOL_TIMEOUT_SECS",
        "SESSION_LIST_LIMIT",
        "VIDEO_SEARCH_URL",
        "PLAYLIST_URL",
        "CORS_ORIGINS",
        "ENVIRONMENT",
        "DATABASE_URL",
        "OLLAMA_URL",
        "OLLAMA_TEMPERATURE",
    ];

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[], AGENT_VARS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.catalog_path, PathBuf::from("playlist.json"));
        assert_eq!(config.embedding_backend, EmbeddingBackend::Ollama);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.browser_mode, BrowserMode::System);
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(config.model_timeout(), Duration::from_secs(120));
        assert_eq!(config.tool_timeout(), Duration::from_secs(15));
        assert_eq!(config.session_list_limit, 20);
        assert_eq!(config.playlist_url.as_str(), DEFAULT_PLAYLIST_URL);
        assert!(config.cors_allowed_origins.is_none());
    }

    #[test]
    fn test_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(
            &[
                ("EMBEDDING_BACKEND", "Hashing"),
                ("STORE_BACKEND", "memory"),
                ("BROWSER_MODE", "log"),
                ("AGENT_MAX_ROUNDS", "3"),
                ("CORS_ORIGINS", "http://a.test, ,http://b.test"),
            ],
            &["ENVIRONMENT"],
        );

        let config = Config::from_env().unwrap();
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashing);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.browser_mode, BrowserMode::Log);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("EMBEDDING_BACKEND", "faiss")], &[]);

        let err = Config::from_env().unwrap_err().to_string();
        assert!(err.contains("EMBEDDING_BACKEND"));
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("AGENT_MAX_ROUNDS", "0")], &[]);

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_database_url_required_in_production() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(
            &[("ENVIRONMENT", "production"), ("STORE_BACKEND", "postgres")],
            &["DATABASE_URL"],
        );

        let err = Config::from_env().unwrap_err().to_string();
        assert!(err.contains("DATABASE_URL"));
        assert!(err.contains("required in production"));
    }

    #[test]
    fn test_memory_store_needs_no_database_in_production() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(
            &[("ENVIRONMENT", "production"), ("STORE_BACKEND", "memory")],
            &["DATABASE_URL"],
        );

        assert!(Config::from_env().is_ok());
    }

    #[test]
    fn test_non_http_search_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("VIDEO_SEARCH_URL", "ftp://example.com")], &[]);

        assert!(Config::from_env().is_err());
    }
}
