use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::LocalConfig;
use crate::errors::{constants::*, Result, TtsError};
use crate::tts::local::engine::{EngineArgs, EspeakEngine, LocalEngine};
use crate::tts::provider::{
    verify_output, Capabilities, Gender, SynthesisOutput, SynthesisParams, SynthesisRequest,
    TextFormat, TtsProvider, Voice, VoiceQuality,
};
use crate::tts::provider_id::{ProviderId, ProviderKind};

/// Offline provider driving a local engine binary.
///
/// A started synthesis runs to completion on a blocking worker; dropping the
/// future does not stop the engine.
#[derive(Debug)]
pub struct LocalProvider {
    engine: Arc<dyn LocalEngine>,
    max_text_bytes: usize,
    available: OnceCell<bool>,
    voices: OnceCell<Vec<Voice>>,
}

impl LocalProvider {
    pub fn new(config: &LocalConfig) -> Self {
        Self::with_engine(Arc::new(EspeakEngine::new(&config.engine)), config.max_text_bytes)
    }

    pub fn with_engine(engine: Arc<dyn LocalEngine>, max_text_bytes: usize) -> Self {
        Self {
            engine,
            max_text_bytes,
            available: OnceCell::new(),
            voices: OnceCell::new(),
        }
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn LocalEngine>) -> Result<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || work(engine))
            .await
            .map_err(|e| TtsError::synthesis(ProviderId::Local, format!("engine worker failed: {}", e)))?
    }
}

pub fn engine_args(voice: &str, params: &SynthesisParams) -> EngineArgs {
    EngineArgs {
        voice: voice.to_string(),
        words_per_minute: (LOCAL_BASE_WPM.saturating_mul(params.rate.saturating_add(100)) / 100)
            .clamp(80, 450),
        pitch: LOCAL_BASE_PITCH.saturating_add(params.pitch).clamp(0, 99),
        amplitude: LOCAL_BASE_AMPLITUDE
            .saturating_add(params.volume.saturating_mul(2))
            .clamp(0, 200),
    }
}

/// `en-us` -> `en-US`
fn locale_from_language(language: &str) -> String {
    let mut parts = language.split('-');
    let primary = parts.next().unwrap_or_default().to_ascii_lowercase();
    match parts.next() {
        Some(region) if region.len() == 2 => format!("{}-{}", primary, region.to_ascii_uppercase()),
        Some(region) => format!("{}-{}", primary, region),
        None => primary,
    }
}

/// Parses the engine's tabular voice listing.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US            (en 10)
/// ```
pub fn parse_voice_listing(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let language = fields[1];
            let gender = fields[2]
                .rsplit('/')
                .next()
                .map(Gender::parse)
                .unwrap_or(Gender::Unknown);
            Some(Voice {
                id: language.to_string(),
                name: fields[3].replace('_', " "),
                locale: locale_from_language(language),
                gender,
                quality: VoiceQuality::Standard,
                provider: ProviderId::Local,
            })
        })
        .collect()
}

#[async_trait]
impl TtsProvider for LocalProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Local
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            rate: true,
            pitch: true,
            volume: true,
            markup: false,
            chunking: true,
            max_text_bytes: self.max_text_bytes,
        }
    }

    #[tracing::instrument(name = "availability_probe", skip(self))]
    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let available = self
                    .blocking(|engine| Ok(engine.probe()))
                    .await
                    .unwrap_or(false);
                if available {
                    info!("Local engine detected");
                } else {
                    warn!("Local engine not available");
                }
                available
            })
            .await
    }

    async fn get_voices(&self, locale: Option<&str>) -> Result<Vec<Voice>> {
        let voices = self
            .voices
            .get_or_try_init(|| async {
                let listing = self.blocking(|engine| engine.list_voices()).await?;
                let voices = parse_voice_listing(&listing);
                info!(count = voices.len(), "Cached local voice catalog");
                Ok::<_, TtsError>(voices)
            })
            .await?;

        Ok(match locale {
            Some(locale) => voices
                .iter()
                .filter(|voice| voice.matches_locale(locale))
                .cloned()
                .collect(),
            None => voices.clone(),
        })
    }

    #[tracing::instrument(skip(self, request), fields(voice = %request.voice.id, bytes = request.text.len()))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput> {
        if request.format == TextFormat::Ssml {
            return Err(TtsError::rejected(ProviderId::Local, "markup is not supported"));
        }
        if request.voice.provider != ProviderId::Local {
            return Err(TtsError::rejected(
                ProviderId::Local,
                format!("voice {} belongs to {}", request.voice.id, request.voice.provider),
            ));
        }
        if request.text.len() > self.max_text_bytes {
            return Err(TtsError::rejected(
                ProviderId::Local,
                format!("text exceeds {} bytes", self.max_text_bytes),
            ));
        }

        let args = engine_args(&request.voice.id, &request.params);
        let text = request.text.clone();
        let output = request.output.clone();
        self.blocking(move |engine| engine.speak(&args, &text, &output))
            .await?;

        verify_output(ProviderId::Local, request.output.clone()).await
    }
}
