use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Top-level application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Local product catalog location (sqlite URL)
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Primary nutrition API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Secondary (fallback) nutrition API configuration
    #[serde(default)]
    pub fallback: FallbackConfig,
}

/// Primary external API (OAuth-gated) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Whether external lookups are enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OAuth client credentials (can also come from the environment)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms", deserialize_with = "lenient_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum results per search call
    #[serde(default = "default_max_results", deserialize_with = "lenient_max_results")]
    pub max_results: u32,
    /// Initial delay between retries in milliseconds (doubles each attempt)
    #[serde(default = "default_retry_delay_ms", deserialize_with = "lenient_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: None,
            client_secret: None,
            base_url: default_api_base_url(),
            token_url: default_token_url(),
            timeout_ms: default_timeout_ms(),
            max_results: default_max_results(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Secondary external API (token-less) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    /// Whether the fallback chain is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fallback_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms", deserialize_with = "lenient_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_fallback_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    "sqlite://nutrifind.db?mode=rwc".to_string()
}

fn default_api_base_url() -> String {
    "https://platform.fatsecret.com/rest/server.api".to_string()
}

fn default_token_url() -> String {
    "https://oauth.fatsecret.com/connect/token".to_string()
}

fn default_fallback_base_url() -> String {
    "https://world.openfoodfacts.org".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_results() -> u32 {
    20
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Parse a numeric field from either a number or a numeric string; anything
/// unparseable yields `None` so the caller can substitute its default instead
/// of propagating garbage.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_timeout_ms<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(lenient_u64(&value).unwrap_or_else(default_timeout_ms))
}

fn lenient_retry_delay_ms<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(lenient_u64(&value).unwrap_or_else(default_retry_delay_ms))
}

fn lenient_max_results<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(lenient_u64(&value)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_else(default_max_results))
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with NUTRIFIND__ prefix
    /// 2. config.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: NUTRIFIND__API__CLIENT_ID
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            // Optional config file (can be missing)
            .add_source(File::with_name("config").required(false))
            // Use double underscore for nested: NUTRIFIND__API__TIMEOUT_MS
            .add_source(
                Environment::with_prefix("NUTRIFIND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
