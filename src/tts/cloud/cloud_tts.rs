use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use base64::Engine;
use gcp_auth::Token;
use reqwest::{RequestBuilder, StatusCode};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, warn};

use crate::config::CloudConfig;
use crate::errors::{Result, TtsError};
use crate::tts::cloud::{
    pool::{ConnectionPool, PoolConfig},
    structs::{
        audio_config::AudioConfig,
        list_voices_response::{CloudVoice, ListVoicesResponse},
        synthesis_input::SynthesisInput,
        synthesize_request::SynthesizeRequest,
        synthesize_response::SynthesizeResponse,
        voice_selection_params::VoiceSelectionParams,
    },
};
use crate::tts::provider::{
    verify_output, Capabilities, Gender, SynthesisOutput, SynthesisParams, SynthesisRequest,
    TextFormat, TtsProvider, Voice, VoiceQuality,
};
use crate::tts::provider_id::{ProviderId, ProviderKind};

const SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];
const API_KEY_HEADER: &str = "x-goog-api-key";

const CAPABILITIES: Capabilities = Capabilities {
    rate: true,
    pitch: true,
    volume: true,
    markup: true,
    chunking: true,
    max_text_bytes: crate::errors::constants::CLOUD_MAX_TEXT_BYTES,
};

#[derive(Debug)]
enum CloudAuth {
    ApiKey(String),
    ServiceAccount {
        token: Arc<RwLock<Option<Token>>>,
        credentials_path: String,
    },
    Missing,
}

/// Network-bound provider speaking the Cloud Text-to-Speech JSON API.
#[derive(Debug)]
pub struct CloudProvider {
    endpoint: String,
    auth: CloudAuth,
    audio_encoding: String,
    max_text_bytes: usize,
    pool: ConnectionPool,
    voices: RwLock<Option<Vec<Voice>>>,
    availability: Mutex<Option<(bool, Instant)>>,
    availability_ttl: Duration,
}

impl CloudProvider {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        Self::with_pool(config, ConnectionPool::new(PoolConfig::from(config))?)
    }

    pub fn with_pool(config: &CloudConfig, pool: ConnectionPool) -> Result<Self> {
        let auth = match (&config.api_key, &config.credentials_path) {
            (Some(key), _) if !key.trim().is_empty() => CloudAuth::ApiKey(key.clone()),
            (_, Some(path)) if !path.trim().is_empty() => CloudAuth::ServiceAccount {
                token: Arc::new(RwLock::new(None)),
                credentials_path: path.clone(),
            },
            _ => CloudAuth::Missing,
        };

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth,
            audio_encoding: config.audio_encoding.clone(),
            max_text_bytes: config.max_text_bytes,
            pool,
            voices: RwLock::new(None),
            availability: Mutex::new(None),
            availability_ttl: Duration::from_secs(config.availability_cache_secs),
        })
    }

    async fn token(&self) -> Result<Option<String>> {
        let CloudAuth::ServiceAccount {
            token,
            credentials_path,
        } = &self.auth
        else {
            return Ok(None);
        };

        {
            let current = token.read().await;
            if let Some(current) = current.as_ref().filter(|t| !t.has_expired()) {
                return Ok(Some(current.as_str().to_string()));
            }
        }

        let mut current = token.write().await;
        if current.as_ref().map_or(true, |t| t.has_expired()) {
            debug!("Refreshing service account token");
            let authenticator = gcp_auth::from_credentials_file(credentials_path.clone()).await?;
            *current = Some(authenticator.get_token(SCOPES).await?);
        }
        Ok(current.as_ref().map(|t| t.as_str().to_string()))
    }

    async fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        match &self.auth {
            CloudAuth::ApiKey(key) => Ok(builder.header(API_KEY_HEADER, key)),
            CloudAuth::ServiceAccount { .. } => {
                let token = self.token().await.map_err(|e| {
                    TtsError::synthesis(ProviderId::Cloud, format!("authentication failed: {}", e))
                })?;
                Ok(match token {
                    Some(token) => builder.bearer_auth(token),
                    None => builder,
                })
            }
            CloudAuth::Missing => Err(TtsError::synthesis(
                ProviderId::Cloud,
                "no api key or credentials configured",
            )),
        }
    }

    fn build_request(&self, request: &SynthesisRequest) -> SynthesizeRequest {
        let input = match request.format {
            TextFormat::Ssml => SynthesisInput {
                text: None,
                ssml: Some(request.text.clone()),
            },
            TextFormat::Plain => SynthesisInput {
                text: Some(request.text.clone()),
                ssml: None,
            },
        };

        // Markup already carries prosody.
        let params = match request.format {
            TextFormat::Ssml => SynthesisParams::default(),
            TextFormat::Plain => request.params,
        };

        SynthesizeRequest {
            input,
            voice: VoiceSelectionParams {
                languageCode: request.voice.locale.clone(),
                name: request.voice.id.clone(),
                ssmlGender: None,
            },
            audioConfig: audio_config(&self.audio_encoding, &params),
        }
    }

    async fn fetch_voices(&self) -> Result<Vec<Voice>> {
        let pooled = self.pool.acquire().await?;
        let builder = pooled.client().get(format!("{}/voices", self.endpoint));
        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        if !status.is_success() {
            return Err(TtsError::synthesis(
                ProviderId::Cloud,
                format!("voice listing returned HTTP {}", status.as_u16()),
            ));
        }

        let listing: ListVoicesResponse = serde_json::from_str(&body).map_err(|e| {
            TtsError::synthesis(ProviderId::Cloud, format!("malformed voice listing: {}", e))
        })?;
        Ok(listing.voices.into_iter().filter_map(to_voice).collect())
    }

    async fn cached_voices(&self) -> Result<Vec<Voice>> {
        if let Some(voices) = self.voices.read().await.as_ref() {
            return Ok(voices.clone());
        }

        let voices = self.fetch_voices().await?;
        info!(count = voices.len(), "Cached cloud voice catalog");
        *self.voices.write().await = Some(voices.clone());
        Ok(voices)
    }

    fn cached_availability(&self) -> Option<bool> {
        let availability = *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        availability
            .filter(|(_, checked_at)| checked_at.elapsed() < self.availability_ttl)
            .map(|(available, _)| available)
    }

    fn store_availability(&self, available: bool) {
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((available, Instant::now()));
    }
}

/// Maps relative offsets onto the API's native ranges.
fn audio_config(encoding: &str, params: &SynthesisParams) -> AudioConfig {
    let nonzero = |value: i32| (value != 0).then_some(value as f32);
    AudioConfig {
        audioEncoding: encoding.to_string(),
        // 1.0 is normal speed, -50% halves it
        speakingRate: nonzero(params.rate).map(|rate| 1.0 + rate / 100.0),
        // semitones, +-10 at the extremes
        pitch: nonzero(params.pitch).map(|pitch| pitch / 5.0),
        // dB, +-6 at the extremes
        volumeGainDb: nonzero(params.volume).map(|volume| volume * 6.0 / 50.0),
    }
}

fn to_voice(voice: CloudVoice) -> Option<Voice> {
    let locale = voice.languageCodes.first()?.clone();
    let quality = if ["Wavenet", "Neural2", "Studio", "Journey", "Chirp"]
        .iter()
        .any(|tier| voice.name.contains(tier))
    {
        VoiceQuality::Neural
    } else {
        VoiceQuality::Standard
    };

    Some(Voice {
        id: voice.name.clone(),
        name: voice.name,
        locale,
        gender: Gender::parse(&voice.ssmlGender),
        quality,
        provider: ProviderId::Cloud,
    })
}

fn request_error(error: reqwest::Error) -> TtsError {
    let reason = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    TtsError::synthesis(ProviderId::Cloud, format!("{}: {}", reason, error))
}

/// Rejections of the input itself are not the backend's fault.
fn classify_status(status: StatusCode, body: &str) -> TtsError {
    let detail: String = body.chars().take(200).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), detail.trim());
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => TtsError::rejected(ProviderId::Cloud, message),
        _ => TtsError::synthesis(ProviderId::Cloud, message),
    }
}

fn decode_audio(body: &str) -> Result<Vec<u8>> {
    let response: SynthesizeResponse = serde_json::from_str(body).map_err(|e| {
        TtsError::synthesis(ProviderId::Cloud, format!("malformed response: {}", e))
    })?;
    let audio = base64::engine::general_purpose::STANDARD
        .decode(response.audioContent.as_bytes())
        .map_err(|e| TtsError::synthesis(ProviderId::Cloud, format!("invalid audio payload: {}", e)))?;
    if audio.is_empty() {
        return Err(TtsError::synthesis(ProviderId::Cloud, "empty audio payload"));
    }
    Ok(audio)
}

#[async_trait]
impl TtsProvider for CloudProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Cloud
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Network
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            max_text_bytes: self.max_text_bytes,
            ..CAPABILITIES
        }
    }

    #[tracing::instrument(name = "availability_probe", skip(self))]
    async fn is_available(&self) -> bool {
        if matches!(self.auth, CloudAuth::Missing) {
            return false;
        }
        if let Some(available) = self.cached_availability() {
            return available;
        }

        let available = match self.cached_voices().await {
            Ok(voices) => !voices.is_empty(),
            Err(e) => {
                warn!(error = %e, "Cloud provider unavailable");
                false
            }
        };
        self.store_availability(available);
        available
    }

    async fn get_voices(&self, locale: Option<&str>) -> Result<Vec<Voice>> {
        let voices = self.cached_voices().await?;
        Ok(match locale {
            Some(locale) => voices
                .into_iter()
                .filter(|voice| voice.matches_locale(locale))
                .collect(),
            None => voices,
        })
    }

    #[tracing::instrument(skip(self, request), fields(voice = %request.voice.id, bytes = request.text.len()))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput> {
        if request.text.len() > self.max_text_bytes {
            return Err(TtsError::rejected(
                ProviderId::Cloud,
                format!("text exceeds {} bytes", self.max_text_bytes),
            ));
        }

        let body = serde_json::to_string(&self.build_request(request))?;
        let pooled = self.pool.acquire().await?;
        let builder = pooled
            .client()
            .post(format!("{}/text:synthesize", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        drop(pooled);

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let audio = decode_audio(&body)?;
        tokio::fs::write(&request.output, &audio).await?;
        verify_output(ProviderId::Cloud, request.output.clone()).await
    }
}
