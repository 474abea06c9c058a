use std::{env, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{constants::*, Result, TtsError};
use crate::tts::provider_id::ProviderId;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub conversion: ConversionConfig,
    pub cloud: CloudConfig,
    pub local: LocalConfig,
    pub otel_http_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Fallback order. Providers not listed are never tried unless preferred.
    pub priority: Vec<ProviderId>,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            priority: vec![ProviderId::Cloud, ProviderId::Local],
            failure_threshold: CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            recovery_timeout_secs: CIRCUIT_BREAKER_TIMEOUT_SECS,
        }
    }
}

impl ResolverConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub chunk_bytes: usize,
    pub max_concurrent_chunks: usize,
    pub default_locale: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            default_locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub credentials_path: Option<String>,
    pub audio_encoding: String,
    pub max_text_bytes: usize,
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub dns_cache_ttl_secs: u64,
    pub availability_cache_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_CLOUD_ENDPOINT.to_string(),
            api_key: None,
            credentials_path: None,
            audio_encoding: DEFAULT_AUDIO_ENCODING.to_string(),
            max_text_bytes: CLOUD_MAX_TEXT_BYTES,
            max_connections: POOL_MAX_CONNECTIONS,
            max_idle_per_host: POOL_MAX_IDLE_PER_HOST,
            connect_timeout_secs: HTTP_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: HTTP_READ_TIMEOUT_SECS,
            total_timeout_secs: HTTP_TOTAL_TIMEOUT_SECS,
            dns_cache_ttl_secs: DNS_CACHE_TTL_SECS,
            availability_cache_secs: AVAILABILITY_CACHE_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,
    pub engine: String,
    pub max_text_bytes: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: DEFAULT_LOCAL_ENGINE.to_string(),
            max_text_bytes: LOCAL_MAX_TEXT_BYTES,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TtsError::config(format!("Invalid value for {}: {}", name, value))),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str::<Config>(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from `TTS_*` variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(priority) = env::var("TTS_PROVIDER_PRIORITY") {
            config.resolver.priority = priority
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(ProviderId::from_str)
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(threshold) = env_parse("TTS_BREAKER_THRESHOLD")? {
            config.resolver.failure_threshold = threshold;
        }
        if let Some(timeout) = env_parse("TTS_BREAKER_TIMEOUT_SECS")? {
            config.resolver.recovery_timeout_secs = timeout;
        }
        if let Some(chunk_bytes) = env_parse("TTS_CHUNK_BYTES")? {
            config.conversion.chunk_bytes = chunk_bytes;
        }
        if let Some(concurrency) = env_parse("TTS_MAX_CONCURRENT_CHUNKS")? {
            config.conversion.max_concurrent_chunks = concurrency;
        }
        if let Ok(locale) = env::var("TTS_DEFAULT_LOCALE") {
            config.conversion.default_locale = locale;
        }
        if let Ok(endpoint) = env::var("TTS_CLOUD_ENDPOINT") {
            config.cloud.endpoint = endpoint;
        }
        config.cloud.api_key = env::var("TTS_CLOUD_API_KEY").ok();
        config.cloud.credentials_path = env::var("TTS_CLOUD_CREDENTIALS").ok();
        if let Ok(engine) = env::var("TTS_LOCAL_ENGINE") {
            config.local.engine = engine;
        }
        config.otel_http_url = env::var("TTS_OTEL_HTTP_URL").ok();

        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise falls back to the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!(path = %path.display(), "Loading config file");
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "Config file not found, reading environment");
            Self::from_env()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.priority.is_empty() {
            return Err(TtsError::config("resolver.priority must name at least one provider"));
        }
        if self.resolver.failure_threshold == 0 {
            return Err(TtsError::config("resolver.failure_threshold must be positive"));
        }
        if self.conversion.max_concurrent_chunks == 0 {
            return Err(TtsError::config(
                "conversion.max_concurrent_chunks must be positive",
            ));
        }
        if self.conversion.chunk_bytes < 64 {
            return Err(TtsError::config("conversion.chunk_bytes must be at least 64"));
        }
        if self.cloud.max_connections == 0 {
            return Err(TtsError::config("cloud.max_connections must be positive"));
        }
        Ok(())
    }
}
