//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.marquee/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::coordinator::{self, CoordinatorSettings};
use crate::core::image_cache;
use crate::core::rate_gate;
use crate::core::retry::{self, RetryPolicy};
use crate::remote::PosterSize;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MarqueeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub rate_limit_requests: Option<usize>,
    pub rate_limit_window_secs: Option<u64>,
    pub image_rate_limit_requests: Option<usize>,
    pub max_image_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    pub max_entries: Option<usize>,
    pub max_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DisplayConfig {
    pub fps: Option<u32>,
    pub max_browse_items: Option<usize>,
    pub poster_size: Option<PosterSize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "http://localhost:5055";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FPS: u32 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FILE: &str = "marquee.log";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub image_rate_limit_requests: usize,
    pub max_image_bytes: usize,
    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,
    pub fps: u32,
    pub max_browse_items: usize,
    pub poster_size: PosterSize,
    pub log_level: String,
    pub log_file: PathBuf,
}

/// CLI overrides. `None` means the flag was not given.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    /// Every problem found by [`ResolvedConfig::validate`], in field order.
    Invalid(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(problems) => {
                write!(f, "invalid configuration: {}", problems.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// `~/.marquee`, where the config file and (by default) nothing else lives.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".marquee"))
}

/// Returns the path to `~/.marquee/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load config from `~/.marquee/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `MarqueeConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<MarqueeConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(MarqueeConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(MarqueeConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: MarqueeConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!(
        "Config sections: server.base_url={:?} network={:?} cache={:?} display={:?}",
        config.server.base_url, config.network, config.cache, config.display
    );
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# Marquee Configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [server]
# base_url = "http://localhost:5055"   # Or set JELLYSEERR_BASE_URL
# api_key = "..."                      # Or set JELLYSEERR_API_KEY

# [network]
# request_timeout_secs = 5
# max_attempts = 3
# base_backoff_ms = 1000               # Grows 1.5x per failed attempt
# rate_limit_requests = 30             # API calls per window
# rate_limit_window_secs = 60
# image_rate_limit_requests = 120      # Poster downloads per window
# max_image_bytes = 5242880           # Hard ceiling; larger values are rejected

# [cache]
# max_entries = 50
# max_bytes = 28311552

# [display]
# fps = 60
# max_browse_items = 10
# poster_size = "w500"                 # w92 w154 w185 w342 w500 w780 original

# [logging]
# level = "info"                       # Or set LOG_LEVEL
# file = "marquee.log"                 # Or set LOG_FILE
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &MarqueeConfig, cli: &CliOverrides) -> ResolvedConfig {
    // Base URL: CLI → env → config → default
    let base_url = cli
        .base_url
        .clone()
        .or_else(|| std::env::var("JELLYSEERR_BASE_URL").ok())
        .or_else(|| config.server.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    // API key: env → config
    let api_key = std::env::var("JELLYSEERR_API_KEY")
        .ok()
        .or_else(|| config.server.api_key.clone())
        .filter(|k| !k.trim().is_empty());

    // Log level: CLI → env → config → default; unknown levels fall back
    let requested_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        .to_lowercase();
    let log_level = if LOG_LEVELS.contains(&requested_level.as_str()) {
        requested_level
    } else {
        warn!("Unknown log level {:?}, using {}", requested_level, DEFAULT_LOG_LEVEL);
        DEFAULT_LOG_LEVEL.to_string()
    };

    // Log file: CLI → env → config → default, then confined to allowed dirs
    let requested_file = cli
        .log_file
        .clone()
        .or_else(|| std::env::var("LOG_FILE").ok())
        .or_else(|| config.logging.file.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
    let log_file = resolve_log_path(&requested_file, &allowed_log_dirs());

    let net = &config.network;
    ResolvedConfig {
        base_url,
        api_key,
        request_timeout: Duration::from_secs(
            net.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
        max_attempts: net.max_attempts.unwrap_or(retry::DEFAULT_MAX_ATTEMPTS),
        base_backoff: net
            .base_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(retry::DEFAULT_BASE_BACKOFF),
        rate_limit_requests: net.rate_limit_requests.unwrap_or(rate_gate::DEFAULT_QUOTA),
        rate_limit_window: net
            .rate_limit_window_secs
            .map(Duration::from_secs)
            .unwrap_or(rate_gate::DEFAULT_WINDOW),
        image_rate_limit_requests: net
            .image_rate_limit_requests
            .unwrap_or(coordinator::DEFAULT_IMAGE_RATE_LIMIT),
        max_image_bytes: net
            .max_image_bytes
            .unwrap_or(coordinator::DEFAULT_MAX_IMAGE_BYTES),
        cache_max_entries: config
            .cache
            .max_entries
            .unwrap_or(image_cache::DEFAULT_MAX_ENTRIES),
        cache_max_bytes: config
            .cache
            .max_bytes
            .unwrap_or(image_cache::DEFAULT_MAX_BYTES),
        fps: config.display.fps.unwrap_or(DEFAULT_FPS),
        max_browse_items: config
            .display
            .max_browse_items
            .unwrap_or(coordinator::DEFAULT_MAX_BROWSE_ITEMS),
        poster_size: config.display.poster_size.unwrap_or_default(),
        log_level,
        log_file,
    }
}

/// Directories a log file may be written to: the temp dir, `~/.marquee`,
/// and the working directory.
pub fn allowed_log_dirs() -> Vec<PathBuf> {
    let mut allowed = vec![std::env::temp_dir()];
    allowed.extend(config_dir());
    if let Ok(cwd) = std::env::current_dir() {
        allowed.push(cwd);
    }
    allowed
}

/// Makes `requested` absolute (relative to the working directory) and keeps
/// it only if it sits under one of `allowed`. Anything else, including paths
/// that climb out with `..`, becomes `<tmp>/marquee.log`.
pub fn resolve_log_path(requested: &str, allowed: &[PathBuf]) -> PathBuf {
    let fallback = std::env::temp_dir().join(DEFAULT_LOG_FILE);
    let path = Path::new(requested);
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        warn!("Log path {:?} escapes its directory, using {}", requested, fallback.display());
        return fallback;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return fallback,
        }
    };

    if allowed.iter().any(|dir| absolute.starts_with(dir)) {
        absolute
    } else {
        warn!(
            "Log path {} is outside the allowed directories, using {}",
            absolute.display(),
            fallback.display()
        );
        fallback
    }
}

impl ResolvedConfig {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            Ok(url) => problems.push(format!(
                "base_url must be an http(s) URL with a host, got scheme {:?}",
                url.scheme()
            )),
            Err(e) => problems.push(format!("base_url {:?} is not a URL: {e}", self.base_url)),
        }
        if !(1..=120).contains(&self.fps) {
            problems.push(format!("fps must be 1..=120, got {}", self.fps));
        }
        let timeout = self.request_timeout.as_secs();
        if !(1..=60).contains(&timeout) {
            problems.push(format!("request_timeout_secs must be 1..=60, got {timeout}"));
        }
        if !(1..=10).contains(&self.max_attempts) {
            problems.push(format!("max_attempts must be 1..=10, got {}", self.max_attempts));
        }
        if !(1..=1000).contains(&self.cache_max_entries) {
            problems.push(format!(
                "cache max_entries must be 1..=1000, got {}",
                self.cache_max_entries
            ));
        }
        if self.cache_max_bytes == 0 {
            problems.push("cache max_bytes must be positive".to_string());
        }
        if self.rate_limit_requests == 0 || self.image_rate_limit_requests == 0 {
            problems.push("rate limits must be positive".to_string());
        }
        if self.rate_limit_window.is_zero() {
            problems.push("rate_limit_window_secs must be positive".to_string());
        }
        let ceiling = coordinator::DEFAULT_MAX_IMAGE_BYTES;
        if !(1..=ceiling).contains(&self.max_image_bytes) {
            problems.push(format!(
                "max_image_bytes must be 1..={ceiling}, got {}",
                self.max_image_bytes
            ));
        }
        if self.max_browse_items == 0 {
            problems.push("max_browse_items must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_backoff: self.base_backoff,
                attempt_timeout: self.request_timeout,
                ..RetryPolicy::default()
            },
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_window: self.rate_limit_window,
            image_rate_limit_requests: self.image_rate_limit_requests,
            max_image_bytes: self.max_image_bytes,
            cache_max_entries: self.cache_max_entries,
            cache_max_bytes: self.cache_max_bytes,
            max_browse_items: self.max_browse_items,
            ..CoordinatorSettings::default()
        }
    }
}
