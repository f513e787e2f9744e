// Configuration loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::utils::find_ytdlp;

/// Browser User-Agent sent to every upstream
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0 Safari/537.36";

pub const DEFAULT_TIKWM_BASE_URL: &str = "https://www.tikwm.com/api/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tikwm: TikwmConfig,
    pub ytdlp: YtDlpConfig,
    pub resolver: ResolverConfig,
    pub expander: ExpanderConfig,
    pub logging: LoggingConfig,
}

/// HTTP method used to call the resolution API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    Get,
    #[default]
    Post,
}

impl FromStr for RequestMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            _ => Err(()),
        }
    }
}

/// TikWM-compatible HTTP provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TikwmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub method: RequestMethod,
    /// Ask the API for the HD rendition
    pub hd: bool,
    pub timeout_secs: f64,
    /// Attempts per resolution (at least 1)
    pub max_retries: u32,
    /// First backoff delay, doubled after every failed attempt
    pub backoff_base_secs: f64,
    /// 0 disables caching
    pub cache_ttl_secs: u64,
    /// `None` or 0 means unbounded
    pub cache_capacity: Option<usize>,
    pub user_agent: String,
    pub referer: String,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
}

impl Default for TikwmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TIKWM_BASE_URL.to_string(),
            api_key: None,
            method: RequestMethod::Post,
            hd: true,
            timeout_secs: 20.0,
            max_retries: 3,
            backoff_base_secs: 0.5,
            cache_ttl_secs: 600,
            cache_capacity: Some(50),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: "https://www.tikwm.com/".to_string(),
            proxy: None,
        }
    }
}

impl TikwmConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_secs = base.as_secs_f64();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    /// Attempts clamped to at least one
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Backoff base clamped to at least 100ms
    pub fn backoff_base(&self) -> Duration {
        secs(self.backoff_base_secs).max(Duration::from_millis(100))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Local yt-dlp extraction provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    /// Program to run (`yt-dlp`, or `python3` together with `-m yt_dlp`)
    pub program: String,
    /// Arguments placed before the generated ones
    pub leading_args: Vec<String>,
    /// Parent directory for per-call temporary directories
    pub work_dir: Option<PathBuf>,
    /// Overall deadline for one extraction
    pub timeout_secs: f64,
    /// Extractions allowed to run at once
    pub max_concurrent: usize,
    pub format: String,
    pub merge_output_format: String,
    pub user_agent: String,
    pub referer: String,
    pub socket_timeout_secs: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub concurrent_fragments: u32,
    pub http_chunk_size: String,
    pub proxy: Option<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            leading_args: Vec::new(),
            work_dir: None,
            timeout_secs: 20.0,
            max_concurrent: 2,
            format: "best[ext=mp4]/best".to_string(),
            merge_output_format: "mp4".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: "https://www.tiktok.com/".to_string(),
            socket_timeout_secs: 10,
            retries: 2,
            fragment_retries: 2,
            concurrent_fragments: 4,
            http_chunk_size: "1M".to_string(),
            proxy: None,
        }
    }
}

impl YtDlpConfig {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Provider chain settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for each provider attempt, 0 = none
    pub attempt_timeout_secs: f64,
    /// Replace the chain with the unavailable placeholder
    pub maintenance: bool,
}

impl ResolverConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_secs > 0.0).then(|| secs(self.attempt_timeout_secs))
    }
}

/// Short-URL expander
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpanderConfig {
    pub timeout_secs: f64,
    pub proxy: Option<String>,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            proxy: None,
        }
    }
}

impl ExpanderConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Settings::default();

        if let Some(base) = get("TIKWM_API_BASE_URL") {
            settings.tikwm.base_url = normalize_api_base(&base);
        }
        settings.tikwm.api_key = get("TIKWM_API_KEY");
        if let Some(method) = get("TIKWM_METHOD") {
            settings.tikwm.method = method.parse().map_err(|_| invalid("TIKWM_METHOD", &method))?;
        }
        if let Some(v) = parse_timeout(&get, "HTTP_TIMEOUT_SEC")? {
            settings.tikwm.timeout_secs = v;
        }
        if let Some(v) = parse_var::<u32>(&get, "MAX_RETRIES")? {
            settings.tikwm.max_retries = v;
        }
        if let Some(v) = parse_var::<f64>(&get, "BACKOFF_BASE_SEC")? {
            settings.tikwm.backoff_base_secs = v;
        }
        if let Some(v) = parse_var::<u64>(&get, "CACHE_TTL_SEC")? {
            settings.tikwm.cache_ttl_secs = v;
        }
        if let Some(v) = parse_var::<usize>(&get, "CACHE_CAPACITY")? {
            settings.tikwm.cache_capacity = (v > 0).then_some(v);
        }

        settings.ytdlp.program = get("YTDLP_PATH").unwrap_or_else(find_ytdlp);
        if let Some(v) = parse_timeout(&get, "YTDLP_TIMEOUT_SEC")? {
            settings.ytdlp.timeout_secs = v;
        }
        if let Some(v) = parse_var::<usize>(&get, "YTDLP_MAX_CONCURRENT")? {
            settings.ytdlp.max_concurrent = v;
        }
        settings.ytdlp.work_dir = get("YTDLP_WORK_DIR").map(PathBuf::from);

        let proxy = get("PROXY");
        settings.tikwm.proxy = proxy.clone();
        settings.ytdlp.proxy = proxy.clone();
        settings.expander.proxy = proxy;

        if let Some(v) = parse_var::<f64>(&get, "PROVIDER_TIMEOUT_SEC")? {
            settings.resolver.attempt_timeout_secs = v;
        }
        if let Some(v) = get("MAINTENANCE_MODE") {
            settings.resolver.maintenance = parse_bool(&v).ok_or_else(|| invalid("MAINTENANCE_MODE", &v))?;
        }

        if let Some(level) = get("LOG_LEVEL") {
            settings.logging.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            settings.logging.format = format;
        }

        Ok(settings)
    }
}

/// Make sure the base URL ends with `/api/`
pub fn normalize_api_base(base: &str) -> String {
    let base = base.trim();
    if base.ends_with("/api/") {
        base.to_string()
    } else if base.ends_with("/api") {
        format!("{}/", base)
    } else if base.ends_with('/') {
        format!("{}api/", base)
    } else {
        format!("{}/api/", base)
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| invalid(key, &raw)),
        None => Ok(None),
    }
}

/// Seconds for a hard deadline; zero would fail every call at once
fn parse_timeout(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<f64>, ConfigError> {
    match parse_var::<f64>(get, key)? {
        Some(v) if !(v.is_finite() && v > 0.0) => Err(invalid(key, &v.to_string())),
        other => Ok(other),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
