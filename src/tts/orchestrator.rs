use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ConversionConfig};
use crate::errors::{validation, Result, TtsError};
use crate::tts::{
    audio,
    provider::{Capabilities, SynthesisOutput, SynthesisParams, Voice},
    provider_id::ProviderId,
    resolver::{FallbackRequest, ProviderResolver, ProviderStatus},
    text::{chunk_text, fit_chunk, prepare, reassemble_in_order},
};

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub text: String,
    pub voice_id: String,
    pub params: SynthesisParams,
    pub output: PathBuf,
    /// Tried first; the voice must belong to it.
    pub provider: Option<ProviderId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutput {
    pub path: PathBuf,
    /// Providers that produced audio, in first-use order.
    pub providers: Vec<ProviderId>,
    pub chunks: usize,
}

fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Refuses output paths that no provider could write to.
async fn check_output(output: &Path) -> Result<()> {
    if output.file_name().is_none() {
        return Err(TtsError::invalid_input(format!(
            "output path {} has no file name",
            output.display()
        )));
    }

    let dir = output_dir(output);
    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(TtsError::invalid_input(format!(
                "{} is not a directory",
                dir.display()
            )))
        }
        Err(e) => {
            return Err(TtsError::invalid_input(format!(
                "output directory {} is not usable: {}",
                dir.display(),
                e
            )))
        }
    }

    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_dir() => Err(TtsError::invalid_input(format!(
            "output path {} is a directory",
            output.display()
        ))),
        _ => Ok(()),
    }
}

/// Scratch directory beside the output, removed when dropped.
///
/// Providers only ever write in here; the output path is replaced by a rename
/// once the whole conversion has succeeded.
struct ChunkWorkspace {
    dir: PathBuf,
}

impl ChunkWorkspace {
    async fn create(output: &Path) -> Result<Self> {
        let dir = output_dir(output).join(format!(".tts-chunks-{}", Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.map_err(|e| {
            TtsError::invalid_input(format!("cannot write next to {}: {}", output.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn chunk_path(&self, index: usize, extension: &str) -> PathBuf {
        self.dir.join(format!("chunk-{:05}.{}", index, extension))
    }

    fn merged_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("merged.{}", extension))
    }
}

impl Drop for ChunkWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to remove chunk workspace");
        }
    }
}

/// Entry point for conversions: validates, prepares and chunks text, then
/// drives the provider fallback chain and reassembles the audio.
#[derive(Debug)]
pub struct ConversionOrchestrator {
    resolver: Arc<ProviderResolver>,
    config: ConversionConfig,
    cancel: CancellationToken,
}

impl ConversionOrchestrator {
    pub fn new(resolver: Arc<ProviderResolver>, config: ConversionConfig) -> Self {
        Self {
            resolver,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = ProviderResolver::from_config(config)?;
        Ok(Self::new(Arc::new(resolver), config.conversion.clone()))
    }

    pub fn resolver(&self) -> &ProviderResolver {
        &self.resolver
    }

    /// Requests a cooperative stop. Calls already inside a provider finish;
    /// no further attempt or chunk is started.
    pub fn stop(&self) {
        info!("Stopping conversions");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn chain_capabilities(&self) -> impl Iterator<Item = Capabilities> + '_ {
        self.resolver
            .priority()
            .iter()
            .filter_map(|id| self.resolver.provider(*id))
            .map(|provider| provider.capabilities())
    }

    /// Largest chunk every enabled provider accepts.
    fn chunk_limit(&self) -> usize {
        self.chain_capabilities()
            .map(|caps| caps.max_text_bytes)
            .chain(std::iter::once(self.config.chunk_bytes))
            .min()
            .unwrap_or(self.config.chunk_bytes)
    }

    /// Chunks that stay within every provider's limit after shaping.
    fn split(&self, text: &str, params: &SynthesisParams) -> Vec<String> {
        let mut chunks = chunk_text(text, self.chunk_limit());
        for caps in self.chain_capabilities() {
            chunks = chunks
                .into_iter()
                .flat_map(|chunk| fit_chunk(chunk, &caps, params))
                .collect();
        }
        chunks
    }

    async fn resolve_voice(&self, request: &ConversionRequest) -> Result<Voice> {
        validation::validate_voice_id(&request.voice_id)?;

        if let Some(provider) = request.provider {
            if self.resolver.provider(provider).is_none() {
                return Err(TtsError::UnknownProvider(provider.to_string()));
            }
        }

        let voice = self
            .resolver
            .find_voice(&request.voice_id, request.provider)
            .await
            .ok_or_else(|| TtsError::UnknownVoice(request.voice_id.clone()))?;

        match request.provider {
            Some(provider) if provider != voice.provider => Err(TtsError::invalid_input(format!(
                "voice {} belongs to {}, not {}",
                voice.id, voice.provider, provider
            ))),
            _ => Ok(voice),
        }
    }

    /// Converts `request.text` into audio at `request.output`.
    ///
    /// Validation failures, including an unusable output path, return before
    /// any provider is called. The output path is only written once every
    /// chunk has succeeded; a failed conversion leaves it as it was.
    #[tracing::instrument(skip(self, request), fields(voice = %request.voice_id, output = %request.output.display()))]
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutput> {
        if self.cancel.is_cancelled() {
            return Err(TtsError::Cancelled);
        }

        validation::validate_params(&request.params)?;
        validation::validate_text(&request.text)?;
        check_output(&request.output).await?;
        let voice = self.resolve_voice(request).await?;
        let text = prepare(&request.text)?;
        let workspace = ChunkWorkspace::create(&request.output).await?;

        let chunks = self.split(&text, &request.params);
        let preferred = request.provider.or(Some(voice.provider));
        info!(chunks = chunks.len(), provider = ?preferred, "Starting conversion");

        let extension = request
            .output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3")
            .to_string();
        let parts = self
            .convert_chunks(&workspace, &extension, &chunks, &voice, request, preferred)
            .await?;

        if self.cancel.is_cancelled() {
            return Err(TtsError::Cancelled);
        }

        let mut providers = Vec::new();
        for part in &parts {
            if !providers.contains(&part.provider) {
                providers.push(part.provider);
            }
        }
        let paths: Vec<PathBuf> = parts.into_iter().map(|part| part.path).collect();
        let audio = match paths.as_slice() {
            [single] => single.clone(),
            _ => {
                let merged = workspace.merged_path(&extension);
                audio::merge_files(&paths, &merged).await?;
                merged
            }
        };
        tokio::fs::rename(&audio, &request.output).await?;

        info!(chunks = paths.len(), providers = ?providers, "Conversion finished");
        Ok(ConversionOutput {
            path: request.output.clone(),
            providers,
            chunks: paths.len(),
        })
    }

    async fn convert_chunk(
        &self,
        index: usize,
        request: FallbackRequest<'_>,
    ) -> Result<(usize, SynthesisOutput)> {
        if self.cancel.is_cancelled() {
            return Err(TtsError::Cancelled);
        }
        let output = self
            .resolver
            .convert_with_fallback(request, &self.cancel)
            .await?;
        debug!(chunk = index, provider = %output.provider, "Chunk converted");
        Ok((index, output))
    }

    /// The first chunk goes through the whole fallback chain; the provider
    /// that serves it serves every other chunk, so the pieces share one audio
    /// format. A later chunk failing on that provider fails the conversion.
    async fn convert_chunks(
        &self,
        workspace: &ChunkWorkspace,
        extension: &str,
        chunks: &[String],
        voice: &Voice,
        request: &ConversionRequest,
        preferred: Option<ProviderId>,
    ) -> Result<Vec<SynthesisOutput>> {
        let params = &request.params;
        let paths: Vec<PathBuf> = (0..chunks.len())
            .map(|index| workspace.chunk_path(index, extension))
            .collect();

        let (Some(first_chunk), Some(first_path)) = (chunks.first(), paths.first()) else {
            return Err(TtsError::EmptyText);
        };
        let (_, first) = self
            .convert_chunk(
                0,
                FallbackRequest {
                    text: first_chunk,
                    voice,
                    params,
                    output: first_path,
                    preferred,
                    exclusive: false,
                },
            )
            .await?;
        let pinned = first.provider;
        if chunks.len() > 1 {
            debug!(provider = %pinned, remaining = chunks.len() - 1, "Remaining chunks pinned to provider");
        }

        let rest: Vec<(usize, SynthesisOutput)> =
            stream::iter(chunks.iter().zip(paths.iter()).enumerate().skip(1))
                .map(|(index, (chunk, path))| {
                    self.convert_chunk(
                        index,
                        FallbackRequest {
                            text: chunk,
                            voice,
                            params,
                            output: path,
                            preferred: Some(pinned),
                            exclusive: true,
                        },
                    )
                })
                .buffer_unordered(self.config.max_concurrent_chunks.max(1))
                .try_collect()
                .await?;

        let mut parts = Vec::with_capacity(chunks.len());
        parts.push(first);
        parts.extend(reassemble_in_order(rest));
        Ok(parts)
    }

    pub async fn convert_text_to_speech(
        &self,
        text: &str,
        voice_id: &str,
        params: SynthesisParams,
        output: &Path,
        provider: Option<ProviderId>,
    ) -> bool {
        let request = ConversionRequest {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
            params,
            output: output.to_path_buf(),
            provider,
        };
        match self.convert(&request).await {
            Ok(_) => true,
            Err(e) if e.is_validation() => {
                warn!(error = %e, "Conversion rejected");
                false
            }
            Err(e) => {
                error!(error = %e, "Conversion failed");
                false
            }
        }
    }

    /// Converts a text file. The output defaults to an `.mp3` next to the
    /// input.
    pub async fn convert_file_to_speech(
        &self,
        input: &Path,
        output: Option<&Path>,
        voice_id: &str,
        params: SynthesisParams,
        provider: Option<ProviderId>,
    ) -> bool {
        let text = match tokio::fs::read_to_string(input).await {
            Ok(text) => text,
            Err(e) => {
                error!(input = %input.display(), error = %e, "Cannot read input file");
                return false;
            }
        };
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input.with_extension("mp3"));

        self.convert_text_to_speech(&text, voice_id, params, &output, provider)
            .await
    }

    /// Voices across available providers, or of one provider when given.
    pub async fn get_available_voices(
        &self,
        locale: Option<&str>,
        provider: Option<ProviderId>,
    ) -> Vec<Voice> {
        match provider {
            Some(provider) => match self.resolver.get_voices_by_provider(provider, locale).await {
                Ok(voices) => voices,
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Cannot list voices");
                    Vec::new()
                }
            },
            None => self.resolver.get_all_voices(locale).await,
        }
    }

    /// First voice for the configured default locale.
    pub async fn default_voice(&self, provider: Option<ProviderId>) -> Option<Voice> {
        self.get_available_voices(Some(&self.config.default_locale), provider)
            .await
            .into_iter()
            .next()
    }

    pub async fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.resolver.statuses().await
    }
}
