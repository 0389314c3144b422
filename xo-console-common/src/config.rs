// Console configuration: server connection, plan and display settings

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::dashboard::DEFAULT_TOP_SR_COUNT;
use crate::plan;

/// Console configuration with support for environment variable overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// XO server URL (default: http://localhost)
    pub server_url: String,

    /// Authentication token, preferred over email/password
    pub token: Option<String>,

    pub email: Option<String>,
    pub password: Option<String>,

    /// Product plan level (1-5)
    pub plan: u8,

    /// Number of SRs in the top usage chart
    pub top_sr_count: usize,

    /// Timeout for a single RPC call, in seconds; restores are never timed out
    pub rpc_timeout_secs: u64,

    /// Interval between polls of remotes, users, permissions and resource sets
    pub refresh_interval_secs: u32,

    /// Default window width
    pub ui_window_width: i32,

    /// Default window height
    pub ui_window_height: i32,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost".to_string(),
            token: None,
            email: None,
            password: None,
            plan: plan::SOURCES,
            top_sr_count: DEFAULT_TOP_SR_COUNT,
            rpc_timeout_secs: 30,
            refresh_interval_secs: 30,
            ui_window_width: 1000,
            ui_window_height: 700,
        }
    }
}

impl ConsoleConfig {
    /// Load the configuration file, then apply environment overrides
    ///
    /// Supported environment variables:
    /// - XO_CONSOLE_URL: Override server URL
    /// - XO_CONSOLE_TOKEN: Override authentication token
    /// - XO_CONSOLE_PLAN: Override product plan level
    /// - XO_CONSOLE_TOP_SRS: Override number of SRs in the usage chart
    pub fn new() -> anyhow::Result<Self> {
        let mut config = Self::load_from_default()?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("XO_CONSOLE_URL") {
            self.server_url = url;
        }

        if let Some(token) = lookup("XO_CONSOLE_TOKEN") {
            self.token = Some(token);
        }

        if let Some(plan) = lookup("XO_CONSOLE_PLAN") {
            match plan.parse::<u8>() {
                Ok(plan) => self.plan = plan,
                Err(_) => log::warn!("Ignoring invalid XO_CONSOLE_PLAN value '{plan}'"),
            }
        }

        if let Some(count) = lookup("XO_CONSOLE_TOP_SRS") {
            match count.parse::<usize>() {
                Ok(count) => self.top_sr_count = count,
                Err(_) => log::warn!("Ignoring invalid XO_CONSOLE_TOP_SRS value '{count}'"),
            }
        }
    }

    /// `$XDG_CONFIG_HOME/xo-console/config.toml`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("xo-console").join("config.toml"))
    }

    pub fn load_from_default() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::load(&path)
    }

    /// Load configuration from a file, defaulting when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// WebSocket endpoint of the JSON-RPC API
    ///
    /// # Examples
    /// ```
    /// # use xo_console_common::ConsoleConfig;
    /// let config = ConsoleConfig {
    ///     server_url: "https://xo.example.org".to_string(),
    ///     ..ConsoleConfig::default()
    /// };
    /// assert_eq!(config.ws_url().unwrap().as_str(), "wss://xo.example.org/api/");
    /// ```
    pub fn ws_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("Invalid server URL '{}'", self.server_url))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => anyhow::bail!("Unsupported URL scheme '{other}'"),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot use scheme {scheme} for {url}"))?;
        url.set_path("/api/");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}
