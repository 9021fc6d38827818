//! Configuration management for tdfetch using the prefer crate.
//!
//! Values are layered: built-in defaults, then the config file, then
//! environment variables (a `.env` file is loaded into the environment by the
//! binary before this runs), then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::models::Credentials;
use crate::scrapers::ScraperConfig;

/// Dashboard used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://2.timedoctor.com";

/// Configuration errors. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

/// Where cached reports are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "files" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::Invalid {
                field: "cache_backend",
                reason: format!("unknown backend '{}'", s),
            }),
        }
    }
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Dashboard root, e.g. `https://2.timedoctor.com`.
    pub base_url: String,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Browser, selectors, timeouts, retry and mismatch handling.
    pub scraper: ScraperConfig,
    pub use_cache: bool,
    pub cache_backend: CacheBackend,
    /// Directory for cache files or the cache database.
    pub cache_dir: PathBuf,
    /// Ignore cached reports older than this.
    pub cache_max_age: Option<Duration>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Save a screenshot here when a login is rejected.
    pub login_failure_screenshot: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: local data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tdfetch");

        Self {
            cache_dir: data_dir.join("cache"),
            data_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            email: None,
            password: None,
            scraper: ScraperConfig::default(),
            use_cache: true,
            cache_backend: CacheBackend::default(),
            cache_max_age: None,
            log_level: "info".to_string(),
            login_failure_screenshot: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            cache_dir: data_dir.join("cache"),
            data_dir,
            ..Default::default()
        }
    }

    /// Validated login credentials.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(
            self.email.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )
    }

    /// Check everything a run needs before any browser work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials()?;

        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(())
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        if self.use_cache && self.cache_backend != CacheBackend::Memory {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = lookup("TD_EMAIL") {
            self.email = Some(email);
        }
        if let Some(password) = lookup("TD_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(base_url) = lookup("TD_BASE_URL") {
            self.base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(headless) = lookup("HEADLESS") {
            self.scraper.browser.headless = parse_bool("HEADLESS", &headless)?;
        }
        if let Some(timeout) = lookup("BROWSER_TIMEOUT") {
            self.scraper.browser.timeout_ms =
                timeout.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "BROWSER_TIMEOUT",
                    reason: format!("'{}' is not a number of milliseconds", timeout),
                })?;
        }
        if let Some(use_cache) = lookup("USE_CACHE") {
            self.use_cache = parse_bool("USE_CACHE", &use_cache)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.trim().to_lowercase();
        }
        if let Some(dir) = lookup("TD_CACHE_DIR") {
            self.cache_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        Ok(())
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            field,
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Prefer `TD_PASSWORD` over storing the password here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cache: Option<bool>,
    /// Cache backend: "memory", "file" or "sqlite".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_backend: Option<String>,
    /// Cache location, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_max_age_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_failure_screenshot: Option<String>,
    /// Scraper behaviour; unspecified fields keep their defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper: Option<ScraperConfig>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers tdfetch config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("tdfetch").await {
            Ok(pref_config) => {
                let target: Option<String> = pref_config.get("target").await.ok();
                let base_url: Option<String> = pref_config.get("base_url").await.ok();
                let email: Option<String> = pref_config.get("email").await.ok();
                let password: Option<String> = pref_config.get("password").await.ok();
                let use_cache: Option<bool> = pref_config.get("use_cache").await.ok();
                let cache_backend: Option<String> = pref_config.get("cache_backend").await.ok();
                let cache_dir: Option<String> = pref_config.get("cache_dir").await.ok();
                let cache_max_age_hours: Option<u64> =
                    pref_config.get("cache_max_age_hours").await.ok();
                let log_level: Option<String> = pref_config.get("log_level").await.ok();
                let login_failure_screenshot: Option<String> =
                    pref_config.get("login_failure_screenshot").await.ok();
                let scraper: Option<ScraperConfig> = pref_config.get("scraper").await.ok();

                let source_path = pref_config.source_path().cloned();

                Config {
                    target,
                    base_url,
                    email,
                    password,
                    use_cache,
                    cache_backend,
                    cache_dir,
                    cache_max_age_hours,
                    log_level,
                    login_failure_screenshot,
                    scraper,
                    source_path,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path. `.toml` files are read
    /// as TOML, everything else as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str::<Config>(&contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Config>(&contents).map_err(|e| e.to_string())
        };

        let mut config = parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) -> Result<(), ConfigError> {
        if let Some(ref target) = self.target {
            settings.data_dir = self.resolve_path(target, base_dir);
            settings.cache_dir = settings.data_dir.join("cache");
        }
        if let Some(ref base_url) = self.base_url {
            settings.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(ref email) = self.email {
            settings.email = Some(email.clone());
        }
        if let Some(ref password) = self.password {
            settings.password = Some(password.clone());
        }
        if let Some(use_cache) = self.use_cache {
            settings.use_cache = use_cache;
        }
        if let Some(ref backend) = self.cache_backend {
            settings.cache_backend = backend.parse()?;
        }
        if let Some(ref dir) = self.cache_dir {
            settings.cache_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(hours) = self.cache_max_age_hours {
            settings.cache_max_age = Some(Duration::from_secs(hours.saturating_mul(3600)));
        }
        if let Some(ref level) = self.log_level {
            settings.log_level = level.to_lowercase();
        }
        if let Some(ref path) = self.login_failure_screenshot {
            settings.login_failure_screenshot = Some(self.resolve_path(path, base_dir));
        }
        if let Some(ref scraper) = self.scraper {
            settings.scraper = scraper.clone();
        }
        Ok(())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Override data directory (--data-dir flag).
    pub data_dir: Option<PathBuf>,
    /// Force headed (`Some(false)`) or headless (`Some(true)`) mode.
    pub headless: Option<bool>,
    /// Disable the report cache (--no-cache flag).
    pub no_cache: bool,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<Settings, ConfigError> {
    // Load config from explicit path or auto-discover
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = match options.data_dir {
        Some(ref data_dir) => Settings::with_data_dir(data_dir.clone()),
        None => Settings::default(),
    };

    // Determine base directory for resolving relative paths
    let base_dir = if options.use_cwd {
        // --cwd flag: use current working directory
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        // Default: use config file's directory, fall back to CWD
        config.base_dir().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    };

    config.apply_to_settings(&mut settings, &base_dir)?;

    // --data-dir override takes precedence over the config file
    if let Some(data_dir) = options.data_dir {
        settings.cache_dir = data_dir.join("cache");
        settings.data_dir = data_dir;
    }

    let mut settings = settings.with_env_overrides()?;

    if let Some(headless) = options.headless {
        settings.scraper.browser.headless = headless;
    }
    if options.no_cache {
        settings.use_cache = false;
    }

    Ok(settings)
}
