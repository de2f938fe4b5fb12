use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub aria2: Aria2Config,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_telegram_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_telegram_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub initial_offset: i64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: default_telegram_api_base_url(),
            poll_timeout_secs: default_telegram_poll_timeout_secs(),
            http_timeout_secs: default_telegram_http_timeout_secs(),
            initial_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aria2Config {
    #[serde(default = "default_aria2_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_aria2_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_aria2_connect_retry_ms")]
    pub connect_retry_ms: u64,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            rpc_url: default_aria2_rpc_url(),
            secret: None,
            connect_attempts: default_aria2_connect_attempts(),
            connect_retry_ms: default_aria2_connect_retry_ms(),
            daemon: DaemonConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_daemon_binary")]
    pub binary: String,
    #[serde(default = "default_daemon_download_dir")]
    pub download_dir: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_daemon_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
    #[serde(default = "default_daemon_max_connections_per_server")]
    pub max_connections_per_server: u32,
    #[serde(default = "default_daemon_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_daemon_binary(),
            download_dir: default_daemon_download_dir(),
            log_file: None,
            max_concurrent_downloads: default_daemon_max_concurrent_downloads(),
            max_connections_per_server: default_daemon_max_connections_per_server(),
            log_level: default_daemon_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            timeout_ms: default_search_timeout_ms(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading config file {}", path.display()))?;
            toml::from_str::<Config>(&text)
                .with_context(|| format!("failed parsing TOML config {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_cli_overrides(&mut self, bot_token: Option<&str>, rpc_url: Option<&str>) {
        if let Some(token) = bot_token {
            self.telegram.bot_token = Some(token.to_owned());
        }
        if let Some(url) = rpc_url {
            self.aria2.rpc_url = url.to_owned();
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ARIA_TG_BOT_TOKEN") {
            self.telegram.bot_token = non_empty(&v);
        }
        if let Some(v) = lookup("ARIA_TG_API_BASE_URL") {
            if let Some(url) = non_empty(&v) {
                self.telegram.api_base_url = url;
            }
        }
        if let Some(v) = lookup("ARIA_TG_POLL_TIMEOUT_SECS") {
            if let Ok(secs) = v.trim().parse() {
                self.telegram.poll_timeout_secs = secs;
            }
        }
        if let Some(v) = lookup("ARIA_TG_RPC_URL") {
            if let Some(url) = non_empty(&v) {
                self.aria2.rpc_url = url;
            }
        }
        if let Some(v) = lookup("ARIA_TG_RPC_SECRET") {
            self.aria2.secret = non_empty(&v);
        }
        if let Some(v) = lookup("ARIA_TG_DAEMON_ENABLED") {
            self.aria2.daemon.enabled = parse_bool(&v);
        }
        if let Some(v) = lookup("ARIA_TG_DOWNLOAD_DIR") {
            if let Some(dir) = non_empty(&v) {
                self.aria2.daemon.download_dir = dir;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.poll_timeout_secs == 0 {
            anyhow::bail!("telegram.poll_timeout_secs must be > 0");
        }
        if self.telegram.http_timeout_secs <= self.telegram.poll_timeout_secs {
            anyhow::bail!("telegram.http_timeout_secs must exceed telegram.poll_timeout_secs");
        }
        Url::parse(&self.telegram.api_base_url)
            .with_context(|| format!("invalid telegram.api_base_url {}", self.telegram.api_base_url))?;
        let rpc_url = Url::parse(&self.aria2.rpc_url)
            .with_context(|| format!("invalid aria2.rpc_url {}", self.aria2.rpc_url))?;
        if !matches!(rpc_url.scheme(), "ws" | "wss") {
            anyhow::bail!("aria2.rpc_url must use ws:// or wss://");
        }
        if self.aria2.connect_attempts == 0 {
            anyhow::bail!("aria2.connect_attempts must be > 0");
        }
        if self.aria2.daemon.enabled && self.aria2.daemon.max_concurrent_downloads == 0 {
            anyhow::bail!("aria2.daemon.max_concurrent_downloads must be > 0");
        }
        if self.aria2.daemon.enabled && self.aria2.daemon.max_connections_per_server == 0 {
            anyhow::bail!("aria2.daemon.max_connections_per_server must be > 0");
        }
        if self.search.timeout_ms == 0 {
            anyhow::bail!("search.timeout_ms must be > 0");
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Result<&str> {
        self.telegram
            .bot_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .context("telegram.bot_token is required (set ARIA_TG_BOT_TOKEN or --bot-token)")
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_owned()
}

fn default_telegram_poll_timeout_secs() -> u64 {
    30
}

fn default_telegram_http_timeout_secs() -> u64 {
    45
}

fn default_aria2_rpc_url() -> String {
    "ws://127.0.0.1:6800/jsonrpc".to_owned()
}

fn default_aria2_connect_attempts() -> u32 {
    10
}

fn default_aria2_connect_retry_ms() -> u64 {
    500
}

fn default_daemon_binary() -> String {
    "aria2c".to_owned()
}

fn default_daemon_download_dir() -> String {
    "downloads".to_owned()
}

fn default_daemon_max_concurrent_downloads() -> u32 {
    5
}

fn default_daemon_max_connections_per_server() -> u32 {
    4
}

fn default_daemon_log_level() -> String {
    "notice".to_owned()
}

fn default_search_base_url() -> String {
    "https://www.torrentz.eu.com".to_owned()
}

fn default_search_timeout_ms() -> u64 {
    15_000
}
