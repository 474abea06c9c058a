use std::{fmt::Debug, path::PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TtsError};
use crate::tts::provider_id::{ProviderId, ProviderKind};

/// What a provider can honour. Unsupported parameters are ignored by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub rate: bool,
    pub pitch: bool,
    pub volume: bool,
    pub markup: bool,
    pub chunking: bool,
    pub max_text_bytes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
    Unknown,
}

impl Gender {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "male" | "m" => Gender::Male,
            "female" | "f" => Gender::Female,
            "neutral" => Gender::Neutral,
            _ => Gender::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceQuality {
    Standard,
    Enhanced,
    Neural,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub locale: String,
    pub gender: Gender,
    pub quality: VoiceQuality,
    pub provider: ProviderId,
}

impl Voice {
    /// Primary language subtag, lowercased (`en` for `en-US`).
    pub fn language(&self) -> String {
        language_of(&self.locale)
    }

    /// `en` matches every English locale, `en-US` only that one.
    pub fn matches_locale(&self, locale: &str) -> bool {
        let wanted = normalize_locale(locale);
        let own = normalize_locale(&self.locale);
        if wanted.contains('-') {
            own == wanted
        } else {
            language_of(&own) == wanted
        }
    }
}

pub fn normalize_locale(locale: &str) -> String {
    locale.trim().replace('_', "-").to_ascii_lowercase()
}

pub fn language_of(locale: &str) -> String {
    normalize_locale(locale)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Relative prosody offsets in percent; zero is the voice's neutral setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub rate: i32,
    pub pitch: i32,
    pub volume: i32,
}

impl SynthesisParams {
    pub fn new(rate: i32, pitch: i32, volume: i32) -> Self {
        Self {
            rate,
            pitch,
            volume,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Ssml,
}

#[derive(Clone, Debug)]
pub struct SynthesisRequest {
    pub text: String,
    pub format: TextFormat,
    pub voice: Voice,
    pub params: SynthesisParams,
    pub output: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisOutput {
    pub provider: ProviderId,
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// A synthesis backend.
///
/// Implementations classify their own failures: input the backend refuses is a
/// validation error, everything else that goes wrong is a service error.
#[async_trait]
pub trait TtsProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities;

    /// Cheap probe. Implementations cache the answer.
    async fn is_available(&self) -> bool;

    /// Voices offered by this provider, all locales when `locale` is `None`.
    async fn get_voices(&self, locale: Option<&str>) -> Result<Vec<Voice>>;

    /// Writes audio for `request.text` to `request.output`.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput>;
}

/// A provider that reports success must have produced audio.
pub async fn verify_output(provider: ProviderId, path: PathBuf) -> Result<SynthesisOutput> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| TtsError::synthesis(provider, format!("no output written: {}", e)))?;
    if metadata.len() == 0 {
        return Err(TtsError::synthesis(provider, "output file is empty"));
    }
    Ok(SynthesisOutput {
        provider,
        path,
        bytes_written: metadata.len(),
    })
}
