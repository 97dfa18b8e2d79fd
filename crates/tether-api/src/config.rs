use config::{builder::DefaultState, Config as ConfigLoader, ConfigBuilder, ConfigError, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tether_types::StreamConfig;

/// Environment prefixes and the section each one overrides
const ENV_SECTIONS: [(&str, &str); 4] = [
    ("SERVER_", "server"),
    ("UPSTREAM_", "upstream"),
    ("STREAM_", "stream"),
    ("LOG_", "logging"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub openrouter_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Used when a request names no model
    pub default_model: String,
    #[serde(default)]
    pub default_system_prompt: Option<String>,
    /// Sent as `X-Title`
    #[serde(default)]
    pub app_name: Option<String>,
    /// Sent as `HTTP-Referer`
    #[serde(default)]
    pub referer: Option<String>,
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: tether_llm::openrouter::OPENROUTER_API_BASE.to_string(),
            default_model: "openai/gpt-4o-mini".to_string(),
            default_system_prompt: None,
            app_name: None,
            referer: None,
            connect_timeout_secs: 10,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    pub heartbeat_interval_secs: u64,
    pub timeout_secs: u64,
    pub buffer_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            heartbeat_interval_secs: defaults.heartbeat_interval.as_secs(),
            timeout_secs: defaults.stream_timeout.as_secs(),
            buffer_capacity: defaults.buffer_capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
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

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (SERVER_, UPSTREAM_, STREAM_, LOG_ prefixes)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        let builder = with_env_overrides(builder, std::env::vars())?;

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Load secrets from ENV (not in TOML)
        cfg.openrouter_api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            ConfigError::Message("OPENROUTER_API_KEY environment variable is required".to_string())
        })?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Per-session streaming limits
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .with_heartbeat_interval(Duration::from_secs(self.stream.heartbeat_interval_secs))
            .with_timeout(Duration::from_secs(self.stream.timeout_secs))
            .with_buffer_capacity(self.stream.buffer_capacity)
    }
}

/// Map `SERVER_PORT=9000` to `server.port = 9000`, and so on for each section.
fn with_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (name, value) in vars {
        let section = ENV_SECTIONS
            .iter()
            .find_map(|(prefix, section)| Some((name.strip_prefix(*prefix)?, *section)));

        if let Some((field, section)) = section {
            if field.is_empty() {
                continue;
            }
            builder = builder.set_override(format!("{}.{}", section, field.to_lowercase()), value)?;
        }
    }
    Ok(builder)
}
