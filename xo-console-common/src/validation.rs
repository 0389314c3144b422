//! Configuration validation utilities
//!
//! Checks the console configuration before the application connects.

use url::Url;

use crate::config::ConsoleConfig;
use crate::plan;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validation result
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate the XO server URL
///
/// # Examples
/// ```
/// # use xo_console_common::validation::validate_server_url;
/// assert!(validate_server_url("https://xo.example.org").is_ok());
/// assert!(validate_server_url("ws://10.0.0.2:8080").is_ok());
/// assert!(validate_server_url("ftp://xo.example.org").is_err());
/// assert!(validate_server_url("xo.example.org").is_err());
/// ```
pub fn validate_server_url(server_url: &str) -> Result<(), String> {
    if server_url.trim().is_empty() {
        return Err("Server URL cannot be empty".to_string());
    }

    let url = Url::parse(server_url).map_err(|e| format!("Invalid URL: {e}"))?;

    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(format!(
            "Unsupported scheme '{}'. Must be one of: http, https, ws, wss",
            url.scheme()
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err("Server URL must include a host".to_string());
    }

    Ok(())
}

/// Validate the product plan level
pub fn validate_plan(level: u8) -> Result<(), String> {
    if !(plan::FREE..=plan::SOURCES).contains(&level) {
        return Err(format!(
            "Plan must be between {} and {}",
            plan::FREE,
            plan::SOURCES
        ));
    }
    Ok(())
}

/// Validate the number of SRs shown in the usage chart
pub fn validate_top_sr_count(count: usize) -> Result<(), String> {
    if count == 0 {
        return Err("At least one SR must be shown".to_string());
    }
    if count > 50 {
        return Err("Cannot show more than 50 SRs".to_string());
    }
    Ok(())
}

/// Validate a whole configuration, collecting every error
pub fn validate_config(config: &ConsoleConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if let Err(message) = validate_server_url(&config.server_url) {
        errors.push(ValidationError::new("server_url", message));
    }

    if let Err(message) = validate_plan(config.plan) {
        errors.push(ValidationError::new("plan", message));
    }

    if let Err(message) = validate_top_sr_count(config.top_sr_count) {
        errors.push(ValidationError::new("top_sr_count", message));
    }

    if config.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "rpc_timeout_secs",
            "RPC timeout must be at least one second",
        ));
    }

    if config.refresh_interval_secs == 0 {
        errors.push(ValidationError::new(
            "refresh_interval_secs",
            "Refresh interval must be at least one second",
        ));
    }

        // Credentials: a token, or both email and password
    let has_token = config.token.as_deref().is_some_and(|t| !t.is_empty());
    if !has_token && (config.email.is_some() != config.password.is_some()) {
        errors.push(ValidationError::new(
            "credentials",
            "Email and password must be set together",
        ));
    }

    if config.ui_window_width < 360 || config.ui_window_height < 360 {
        errors.push(ValidationError::new(
            "ui_window_size",
            "Window must be at least 360x360",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
