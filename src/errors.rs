use crate::tts::provider_id::ProviderId;

/// How a failure is treated by the breaker and the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input was rejected. Never counted against a provider.
    Validation,
    /// The provider itself misbehaved. Counted by its breaker.
    Service,
    /// Fast-fail produced by an open breaker.
    BreakerOpen,
    Cancelled,
}

/// One failed attempt inside a fallback run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    pub kind: ErrorKind,
    pub reason: String,
}

fn format_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.provider, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Custom error types for the text-to-speech pipeline
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{name} out of range ({min}..={max}): {value}")]
    ParameterOutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("Text is empty after cleaning")]
    EmptyText,

    #[error("Text too long (max {max_length} bytes)")]
    TextTooLong { max_length: usize },

    #[error("Request rejected by {provider}: {message}")]
    Rejected {
        provider: ProviderId,
        message: String,
    },

    #[error("Synthesis failed on {provider}: {message}")]
    Synthesis {
        provider: ProviderId,
        message: String,
    },

    #[error("Circuit breaker open for {0}")]
    BreakerOpen(ProviderId),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("No provider available")]
    NoProviderAvailable,

    #[error("All providers failed: {}", format_attempts(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderAttempt> },

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("GCP authentication error: {0}")]
    GCPAuth(#[from] gcp_auth::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TtsError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_regex(message: impl Into<String>) -> Self {
        Self::InvalidRegex(message.into())
    }

    pub fn audio(message: impl Into<String>) -> Self {
        Self::Audio(message.into())
    }

    pub fn text_too_long(max_length: usize) -> Self {
        Self::TextTooLong { max_length }
    }

    pub fn rejected(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::Rejected {
            provider,
            message: message.into(),
        }
    }

    pub fn synthesis(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::Synthesis {
            provider,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::InvalidInput(_)
            | Self::UnknownVoice(_)
            | Self::UnknownProvider(_)
            | Self::ParameterOutOfRange { .. }
            | Self::EmptyText
            | Self::TextTooLong { .. }
            | Self::Rejected { .. }
            | Self::InvalidRegex(_)
            | Self::Toml(_) => ErrorKind::Validation,
            Self::BreakerOpen(_) => ErrorKind::BreakerOpen,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Synthesis { .. }
            | Self::NoProviderAvailable
            | Self::AllProvidersFailed { .. }
            | Self::Audio(_)
            | Self::GCPAuth(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Wav(_) => ErrorKind::Service,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Only service failures move a breaker towards Open.
    pub fn counts_against_provider(&self) -> bool {
        self.kind() == ErrorKind::Service
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TtsError>;

/// Input validation functions
pub mod validation {
    use super::*;
    use crate::tts::provider::SynthesisParams;

    /// Validate raw text before cleaning
    pub fn validate_text(text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        if text.len() > constants::MAX_INPUT_TEXT_BYTES {
            return Err(TtsError::text_too_long(constants::MAX_INPUT_TEXT_BYTES));
        }

        Ok(())
    }

    /// Validate voice identifier syntax
    pub fn validate_voice_id(voice_id: &str) -> Result<()> {
        if voice_id.trim().is_empty() {
            return Err(TtsError::invalid_input("Voice id cannot be empty"));
        }

        if voice_id.len() > constants::MAX_VOICE_ID_LENGTH {
            return Err(TtsError::invalid_input(format!(
                "Voice id too long (max {} characters)",
                constants::MAX_VOICE_ID_LENGTH
            )));
        }

        if !voice_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.+".contains(c))
        {
            return Err(TtsError::UnknownVoice(voice_id.to_string()));
        }

        Ok(())
    }

    fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<()> {
        if value < min || value > max {
            return Err(TtsError::ParameterOutOfRange {
                name,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Validate relative prosody parameters (percent offsets from neutral)
    pub fn validate_params(params: &SynthesisParams) -> Result<()> {
        check_range(
            "rate",
            params.rate,
            constants::RATE_RANGE.0,
            constants::RATE_RANGE.1,
        )?;
        check_range(
            "pitch",
            params.pitch,
            constants::PITCH_RANGE.0,
            constants::PITCH_RANGE.1,
        )?;
        check_range(
            "volume",
            params.volume,
            constants::VOLUME_RANGE.0,
            constants::VOLUME_RANGE.1,
        )
    }
}

/// Constants used throughout the application
pub mod constants {
    // Configuration constants
    pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

    // Cache constants
    pub const DEFAULT_CACHE_SIZE: usize = 1000;

    // Circuit breaker constants
    pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
    pub const CIRCUIT_BREAKER_TIMEOUT_SECS: u64 = 60;

    // Validation constants
    pub const MAX_INPUT_TEXT_BYTES: usize = 5 * 1024 * 1024;
    pub const MAX_VOICE_ID_LENGTH: usize = 100;
    pub const RATE_RANGE: (i32, i32) = (-50, 100);
    pub const PITCH_RANGE: (i32, i32) = (-50, 50);
    pub const VOLUME_RANGE: (i32, i32) = (-50, 50);

    // Conversion constants
    pub const DEFAULT_CHUNK_BYTES: usize = 3000;
    pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 4;
    pub const DEFAULT_LOCALE: &str = "en-US";

    // HTTP pool constants
    pub const POOL_MAX_CONNECTIONS: usize = 10;
    pub const POOL_MAX_IDLE_PER_HOST: usize = 2;
    pub const DNS_CACHE_TTL_SECS: u64 = 300;
    pub const HTTP_TOTAL_TIMEOUT_SECS: u64 = 30;
    pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const HTTP_READ_TIMEOUT_SECS: u64 = 20;
    pub const AVAILABILITY_CACHE_SECS: u64 = 30;

    // Provider constants
    pub const DEFAULT_CLOUD_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1";
    pub const DEFAULT_AUDIO_ENCODING: &str = "MP3";
    pub const CLOUD_MAX_TEXT_BYTES: usize = 5000;
    pub const DEFAULT_LOCAL_ENGINE: &str = "espeak-ng";
    pub const LOCAL_MAX_TEXT_BYTES: usize = 20_000;
    pub const LOCAL_BASE_WPM: i32 = 175;
    pub const LOCAL_BASE_PITCH: i32 = 50;
    pub const LOCAL_BASE_AMPLITUDE: i32 = 100;
}
