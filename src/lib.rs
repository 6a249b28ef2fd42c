//! eSIM compatible device crawler
//!
//! Renders the device list page in a headless browser via chromiumoxide,
//! recovers the device list from JSON-LD (with an HTML heuristic fallback)
//! and delivers the result to a webhook.

mod browser;
pub mod browser_setup;
pub mod cleanup;
pub mod delivery;
pub mod extract;
pub mod fetcher;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod throttle;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "ESIM_CRAWLER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub files: FileConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub debug: bool,
}

/// Downstream webhook that receives the crawl result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url")]
    pub url: String,

    /// Per-attempt request timeout
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// Total delivery attempts, not additional retries
    #[serde(default = "default_webhook_retries")]
    pub retries: u32,

    #[serde(default = "default_webhook_user_agent")]
    pub user_agent: String,
}

/// Artifact paths written during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_output_file")]
    pub output: PathBuf,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default = "default_rendered_page_file")]
    pub rendered_page: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One pretty-printed JSON object
    #[default]
    Json,
    /// One compact JSON object per line
    Jsonl,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::Jsonl),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Target page and timing knobs for the fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Extra wait after the network goes quiet, lets challenge scripts finish
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Quiet window that counts as network idle
    #[serde(default = "default_network_idle_ms")]
    pub network_idle_ms: u64,

    /// Upper bound on fetch plus extraction
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_true")]
    pub console: bool,

    #[serde(default = "default_true")]
    pub file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_webhook_url() -> String {
    "https://n8n.gohub.cloud/webhook/eSIM_compatible".to_string()
}
fn default_webhook_timeout() -> u64 {
    30
}
fn default_webhook_retries() -> u32 {
    3
}
fn default_webhook_user_agent() -> String {
    "eSIM-Crawler/1.0".to_string()
}

fn default_output_file() -> PathBuf {
    PathBuf::from("yesim_devices.json")
}
fn default_rendered_page_file() -> PathBuf {
    PathBuf::from("rendered_page.html")
}
fn default_log_file() -> PathBuf {
    PathBuf::from("esim_crawler.log")
}

fn default_target_url() -> String {
    "https://yesim.app/compatible-devices/".to_string()
}
fn default_navigation_timeout() -> u64 {
    60
}
fn default_settle_delay() -> u64 {
    10
}
fn default_network_idle_ms() -> u64 {
    500
}
fn default_run_timeout() -> u64 {
    300
}
fn default_min_request_interval_ms() -> u64 {
    2_000
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            timeout_secs: default_webhook_timeout(),
            retries: default_webhook_retries(),
            user_agent: default_webhook_user_agent(),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            output: default_output_file(),
            output_format: OutputFormat::default(),
            rendered_page: default_rendered_page_file(),
            log_file: default_log_file(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            navigation_timeout_secs: default_navigation_timeout(),
            settle_delay_secs: default_settle_delay(),
            network_idle_ms: default_network_idle_ms(),
            run_timeout_secs: default_run_timeout(),
            min_request_interval_ms: default_min_request_interval_ms(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: true,
            file: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration once at process start
    ///
    /// Order: defaults, YAML file, environment overrides. The file is
    /// `explicit_path` when given, else `$ESIM_CRAWLER_CONFIG`, else
    /// `./config.yaml` when it exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from("config.yaml");
                local.exists().then_some(local)
            });

        let mut config = match path {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`
    ///
    /// Unparsable values are reported, never silently replaced by defaults.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WEBHOOK_URL") {
            self.webhook.url = url;
        }
        if let Some(value) = lookup("WEBHOOK_TIMEOUT") {
            self.webhook.timeout_secs = parse_env("WEBHOOK_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("WEBHOOK_RETRIES") {
            self.webhook.retries = parse_env("WEBHOOK_RETRIES", value)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("OUTPUT_FILE") {
            self.files.output = PathBuf::from(path);
        }
        if let Some(value) = lookup("OUTPUT_FORMAT") {
            self.files.output_format = parse_env("OUTPUT_FORMAT", value)?;
        }
        if let Some(path) = lookup("RENDERED_PAGE_FILE") {
            self.files.rendered_page = PathBuf::from(path);
        }
        if let Some(path) = lookup("LOG_FILE") {
            self.files.log_file = PathBuf::from(path);
        }
        if let Some(value) = lookup("CRAWL_TIMEOUT") {
            self.crawl.run_timeout_secs = parse_env("CRAWL_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("NAVIGATION_TIMEOUT") {
            self.crawl.navigation_timeout_secs = parse_env("NAVIGATION_TIMEOUT", value)?;
        }
        if let Some(url) = lookup("TARGET_URL") {
            self.crawl.target_url = url;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(value) = lookup("PORT") {
            self.server.port = parse_env("PORT", value)?;
        }
        if let Some(value) = lookup("DEBUG") {
            self.debug = value.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.url.trim().is_empty() {
            return Err(ConfigError::Invalid("webhook url is empty".to_string()));
        }
        if self.webhook.retries == 0 {
            return Err(ConfigError::Invalid(
                "webhook retries must be at least 1".to_string(),
            ));
        }
        let target = url::Url::parse(&self.crawl.target_url).map_err(|e| {
            ConfigError::Invalid(format!("target url {:?}: {e}", self.crawl.target_url))
        })?;
        if target.scheme() != "http" && target.scheme() != "https" {
            return Err(ConfigError::Invalid(
                "target url must start with http:// or https://".to_string(),
            ));
        }
        utils::validate_navigation_timeout(self.crawl.navigation_timeout_secs)?;
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

pub use browser::{BrowserError, BrowserResult, BrowserWrapper};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use delivery::{DeliveryAttempt, DeliveryClient, DeliveryError, DeliveryReport};
pub use extract::{CrawlResult, DeviceSource, extract_devices};
pub use fetcher::{ChromeFetcher, PageSource, RenderedPage};
pub use output::{OutputError, load_output, write_output};
pub use pipeline::{Pipeline, RunError, RunSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.webhook.timeout_secs, 30);
        assert_eq!(config.webhook.retries, 3);
        assert_eq!(config.crawl.navigation_timeout_secs, 60);
        assert_eq!(config.crawl.settle_delay_secs, 10);
        assert_eq!(config.files.output, PathBuf::from("yesim_devices.json"));
        assert_eq!(config.files.output_format, OutputFormat::Json);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "webhook:\n  url: http://localhost:9000/hook\ncrawl:\n  settle_delay_secs: 2\n",
        )
        .unwrap();
        assert_eq!(config.webhook.url, "http://localhost:9000/hook");
        assert_eq!(config.webhook.retries, 3);
        assert_eq!(config.crawl.settle_delay_secs, 2);
        assert_eq!(config.crawl.navigation_timeout_secs, 60);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[
                ("WEBHOOK_URL", "http://hook.test/in"),
                ("WEBHOOK_RETRIES", "5"),
                ("OUTPUT_FORMAT", "jsonl"),
                ("DEBUG", "TRUE"),
                ("PORT", "9090"),
            ]))
            .unwrap();
        assert_eq!(config.webhook.url, "http://hook.test/in");
        assert_eq!(config.webhook.retries, 5);
        assert_eq!(config.files.output_format, OutputFormat::Jsonl);
        assert!(config.debug);
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn unparsable_env_value_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(lookup(&[("WEBHOOK_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "WEBHOOK_TIMEOUT", .. }));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.webhook.retries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.target_url = "ftp://example.com/".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.navigation_timeout_secs = 301;
        assert!(config.validate().is_err());
    }
}
