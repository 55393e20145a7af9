//! Configuration for the billing core.
//!
//! Settings are loaded from `TASKLY_*` environment variables via
//! [`ConfigBuilder::from_env`], with builder overrides for tests and
//! embedded use.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the billing core
#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub billing: BillingConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Billing windows and durations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Days an invoice stays payable after issue.
    #[serde(default = "default_invoice_due_days")]
    pub invoice_due_days: u32,
    /// Days an activated add-on stays usable. `None` grants perpetual access.
    #[serde(default = "default_addon_duration_days")]
    pub addon_duration_days: Option<u32>,
    /// Window used by the expiring-soon query that drives renewal reminders.
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: u32,
}

/// Payment gateway credentials and limits.
///
/// Secrets are held in [`SecretString`] so they never leak through debug
/// output or logs.
#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    /// Bound on the gateway session-creation call.
    pub request_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            billing: BillingConfig::default(),
            gateway: GatewayConfig::default(),
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_due_days: default_invoice_due_days(),
            addon_duration_days: default_addon_duration_days(),
            expiring_soon_days: default_expiring_soon_days(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            webhook_secret: SecretString::from(String::new()),
            request_timeout_seconds: 10,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_invoice_due_days() -> u32 {
    1
}

fn default_addon_duration_days() -> Option<u32> {
    Some(30)
}

fn default_expiring_soon_days() -> u32 {
    3
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

fn get_env(name: &str) -> Option<String> {
    std::env::var(format!("TASKLY_{}", name)).ok()
}

/// Builder for [`Config`] with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_invoice_due_days(mut self, days: u32) -> Self {
        self.config.billing.invoice_due_days = days;
        self
    }

    pub fn with_addon_duration_days(mut self, days: Option<u32>) -> Self {
        self.config.billing.addon_duration_days = days;
        self
    }

    pub fn with_expiring_soon_days(mut self, days: u32) -> Self {
        self.config.billing.expiring_soon_days = days;
        self
    }

    pub fn with_gateway_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gateway.api_key = SecretString::from(key.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.gateway.webhook_secret = SecretString::from(secret.into());
        self
    }

    pub fn with_gateway_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.gateway.request_timeout_seconds = seconds;
        self
    }

    /// Load configuration from environment variables with `TASKLY_` prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env("HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = get_env("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(level) = get_env("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(days) = get_env("INVOICE_DUE_DAYS") {
            if let Ok(d) = days.parse() {
                self.config.billing.invoice_due_days = d;
            }
        }
        if let Some(days) = get_env("ADDON_DURATION_DAYS") {
            // "0" means perpetual access
            match days.parse::<u32>() {
                Ok(0) => self.config.billing.addon_duration_days = None,
                Ok(d) => self.config.billing.addon_duration_days = Some(d),
                Err(_) => {}
            }
        }
        if let Some(days) = get_env("EXPIRING_SOON_DAYS") {
            if let Ok(d) = days.parse() {
                self.config.billing.expiring_soon_days = d;
            }
        }
        if let Some(key) = get_env("GATEWAY_API_KEY") {
            self.config.gateway.api_key = SecretString::from(key);
        }
        if let Some(secret) = get_env("GATEWAY_WEBHOOK_SECRET") {
            self.config.gateway.webhook_secret = SecretString::from(secret);
        }
        if let Some(timeout) = get_env("GATEWAY_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.config.gateway.request_timeout_seconds = t;
            }
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid: unparseable server
    /// address, unknown log level, or zero durations.
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.server.addr().map_err(|e| {
            crate::error::TasklyError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                self.config.server.host, self.config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::TasklyError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.billing.invoice_due_days == 0 {
            return Err(crate::error::TasklyError::bad_request(
                "Invoice due window must be at least one day",
            ));
        }

        if self.config.billing.expiring_soon_days == 0 {
            return Err(crate::error::TasklyError::bad_request(
                "Expiring-soon window must be at least one day",
            ));
        }

        if self.config.gateway.request_timeout_seconds == 0 {
            return Err(crate::error::TasklyError::bad_request(
                "Gateway timeout must be greater than 0",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
