use std::{collections::HashMap, path::Path, sync::Arc};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ResolverConfig};
use crate::errors::{validation, ErrorKind, ProviderAttempt, Result, TtsError};
use crate::tts::{
    cloud::CloudProvider,
    local::LocalProvider,
    provider::{
        Capabilities, SynthesisOutput, SynthesisParams, SynthesisRequest, TtsProvider, Voice,
    },
    provider_id::{ProviderId, ProviderKind},
    text::build_text_for_conversion,
};
use crate::utils::{
    breaker_snapshot, shared_breaker, BreakerPermit, BreakerSnapshot, CircuitBreaker,
    SharedBreaker,
};

/// Provider health for display.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub kind: ProviderKind,
    pub available: bool,
    pub in_priority: bool,
    pub breaker: BreakerSnapshot,
    pub capabilities: Capabilities,
}

/// One text segment to synthesize through the fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    /// Cleaned text; shaped per provider before each attempt.
    pub text: &'a str,
    pub voice: &'a Voice,
    pub params: &'a SynthesisParams,
    pub output: &'a Path,
    pub preferred: Option<ProviderId>,
    /// Only `preferred` may serve the request; there is no fallback.
    pub exclusive: bool,
}

/// Ordered fallback over the registered providers, each behind its own
/// circuit breaker.
#[derive(Debug)]
pub struct ProviderResolver {
    providers: HashMap<ProviderId, Arc<dyn TtsProvider>>,
    breakers: HashMap<ProviderId, SharedBreaker>,
    priority: Vec<ProviderId>,
}

impl ProviderResolver {
    pub fn new(providers: Vec<Arc<dyn TtsProvider>>, config: &ResolverConfig) -> Result<Self> {
        let mut registered = HashMap::new();
        let mut breakers = HashMap::new();
        for provider in providers {
            let id = provider.id();
            breakers.insert(
                id,
                shared_breaker(CircuitBreaker::new(
                    id.as_str(),
                    config.failure_threshold,
                    config.recovery_timeout(),
                )),
            );
            registered.insert(id, provider);
        }

        let mut priority = Vec::new();
        for id in &config.priority {
            if !registered.contains_key(id) {
                warn!(provider = %id, "Provider in priority list is not enabled");
            } else if !priority.contains(id) {
                priority.push(*id);
            }
        }

        if registered.is_empty() {
            return Err(TtsError::config("no providers are enabled"));
        }

        info!(priority = ?priority, "Provider resolver ready");
        Ok(Self {
            providers: registered,
            breakers,
            priority,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers: Vec<Arc<dyn TtsProvider>> = Vec::new();
        if config.cloud.enabled {
            providers.push(Arc::new(CloudProvider::new(&config.cloud)?));
        }
        if config.local.enabled {
            providers.push(Arc::new(LocalProvider::new(&config.local)));
        }
        Self::new(providers, &config.resolver)
    }

    pub fn provider(&self, id: ProviderId) -> Option<&Arc<dyn TtsProvider>> {
        self.providers.get(&id)
    }

    pub fn priority(&self) -> &[ProviderId] {
        &self.priority
    }

    /// Priority order first, then any registered provider outside it.
    fn all_ids(&self) -> Vec<ProviderId> {
        let mut ids = self.priority.clone();
        let mut rest: Vec<ProviderId> = self
            .providers
            .keys()
            .filter(|id| !ids.contains(id))
            .copied()
            .collect();
        rest.sort();
        ids.extend(rest);
        ids
    }

    pub fn breaker_snapshot(&self, id: ProviderId) -> Option<BreakerSnapshot> {
        self.breakers.get(&id).map(breaker_snapshot)
    }

    /// Providers to try, in order: the preferred one, then the priority chain,
    /// without duplicates and without unavailable providers.
    pub async fn candidates(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        let mut order = Vec::with_capacity(self.priority.len() + 1);
        if let Some(preferred) = preferred {
            if self.providers.contains_key(&preferred) {
                order.push(preferred);
            } else {
                warn!(provider = %preferred, "Preferred provider is not enabled");
            }
        }
        for id in &self.priority {
            if !order.contains(id) {
                order.push(*id);
            }
        }

        let mut available = Vec::with_capacity(order.len());
        for id in order {
            let Some(provider) = self.providers.get(&id) else {
                continue;
            };
            if provider.is_available().await {
                available.push(id);
            } else {
                debug!(provider = %id, "Skipping unavailable provider");
            }
        }
        available
    }

    /// The requested voice when `provider` owns it, otherwise the closest
    /// voice it does offer.
    async fn voice_for(&self, provider: &dyn TtsProvider, requested: &Voice) -> Result<Voice> {
        if requested.provider == provider.id() {
            return Ok(requested.clone());
        }

        let language = requested.language();
        let lookups = [Some(requested.locale.as_str()), Some(language.as_str()), None];
        for locale in lookups {
            let voices = provider.get_voices(locale).await?;
            let substitute = voices
                .iter()
                .find(|v| v.gender == requested.gender)
                .or_else(|| voices.first());
            if let Some(substitute) = substitute {
                info!(
                    provider = %provider.id(),
                    requested = %requested.id,
                    substitute = %substitute.id,
                    "Substituting voice for fallback provider"
                );
                return Ok(substitute.clone());
            }
        }

        Err(TtsError::rejected(
            provider.id(),
            format!("no voice comparable to {}", requested.id),
        ))
    }

    /// Tries each candidate in order until one writes `request.output`.
    ///
    /// Validation-class failures move on to the next provider without touching
    /// its breaker. Cancellation is checked before every attempt; a call that
    /// has started is not interrupted. Out-of-range parameters are refused
    /// before any provider is considered.
    #[tracing::instrument(skip(self, request, cancel), fields(voice = %request.voice.id, bytes = request.text.len()))]
    pub async fn convert_with_fallback(
        &self,
        request: FallbackRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        validation::validate_params(request.params)?;

        let mut candidates = self.candidates(request.preferred).await;
        if request.exclusive {
            candidates.retain(|id| Some(*id) == request.preferred);
        }
        if candidates.is_empty() {
            warn!("No provider available");
            return Err(TtsError::NoProviderAvailable);
        }

        let mut attempts: Vec<ProviderAttempt> = Vec::new();
        let mut first_rejection: Option<TtsError> = None;

        for id in candidates {
            if cancel.is_cancelled() {
                return Err(TtsError::Cancelled);
            }
            let (Some(provider), Some(breaker)) = (self.providers.get(&id), self.breakers.get(&id))
            else {
                continue;
            };

            let Some(permit) = BreakerPermit::acquire(breaker) else {
                info!(provider = %id, "Circuit breaker open, skipping provider");
                let error = TtsError::BreakerOpen(id);
                attempts.push(ProviderAttempt {
                    provider: id,
                    kind: error.kind(),
                    reason: error.to_string(),
                });
                continue;
            };

            let result = match self.voice_for(provider.as_ref(), request.voice).await {
                Ok(voice) => {
                    let prepared = build_text_for_conversion(
                        request.text,
                        &provider.capabilities(),
                        request.params,
                    );
                    let synthesis = SynthesisRequest {
                        text: prepared.text,
                        format: prepared.format,
                        voice,
                        params: *request.params,
                        output: request.output.to_path_buf(),
                    };
                    provider.synthesize(&synthesis).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(output) => {
                    permit.success();
                    if !attempts.is_empty() {
                        info!(provider = %id, skipped = attempts.len(), "Fell back to provider");
                    }
                    return Ok(output);
                }
                Err(e) if e.counts_against_provider() => {
                    permit.failure();
                    warn!(provider = %id, error = %e, "Provider failed, trying next");
                    attempts.push(ProviderAttempt {
                        provider: id,
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    permit.release();
                    info!(provider = %id, error = %e, "Provider rejected the request, trying next");
                    attempts.push(ProviderAttempt {
                        provider: id,
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                    first_rejection.get_or_insert(e);
                }
            }
        }

        if let Some(rejection) = first_rejection {
            if attempts.iter().all(|a| a.kind == ErrorKind::Validation) {
                return Err(rejection);
            }
        }
        warn!(attempts = attempts.len(), "All providers failed");
        Err(TtsError::AllProvidersFailed { attempts })
    }

    /// Voices of every available provider, sorted by name.
    pub async fn get_all_voices(&self, locale: Option<&str>) -> Vec<Voice> {
        let mut voices = Vec::new();
        for id in self.all_ids() {
            match self.get_voices_by_provider(id, locale).await {
                Ok(found) => voices.extend(found),
                Err(e) => warn!(provider = %id, error = %e, "Cannot list voices"),
            }
        }
        voices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        voices
    }

    pub async fn get_voices_by_provider(
        &self,
        id: ProviderId,
        locale: Option<&str>,
    ) -> Result<Vec<Voice>> {
        let provider = self
            .providers
            .get(&id)
            .ok_or_else(|| TtsError::UnknownProvider(id.to_string()))?;
        if !provider.is_available().await {
            return Ok(Vec::new());
        }
        let mut voices = provider.get_voices(locale).await?;
        for voice in voices.iter_mut() {
            voice.provider = id;
        }
        Ok(voices)
    }

    pub async fn get_voices_by_kind(&self, kind: ProviderKind, locale: Option<&str>) -> Vec<Voice> {
        let mut voices = Vec::new();
        for id in self.all_ids() {
            let Some(provider) = self.providers.get(&id) else {
                continue;
            };
            if provider.kind() != kind {
                continue;
            }
            match self.get_voices_by_provider(id, locale).await {
                Ok(found) => voices.extend(found),
                Err(e) => warn!(provider = %id, error = %e, "Cannot list voices"),
            }
        }
        voices.sort_by(|a, b| a.name.cmp(&b.name));
        voices
    }

    /// Looks a voice id up across providers, `provider` first when given.
    pub async fn find_voice(&self, voice_id: &str, provider: Option<ProviderId>) -> Option<Voice> {
        let mut ids = self.all_ids();
        if let Some(provider) = provider {
            ids.retain(|id| *id != provider);
            ids.insert(0, provider);
        }
        for id in ids {
            if let Ok(voices) = self.get_voices_by_provider(id, None).await {
                if let Some(voice) = voices.into_iter().find(|v| v.id == voice_id) {
                    return Some(voice);
                }
            }
        }
        None
    }

    pub async fn statuses(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::new();
        for id in self.all_ids() {
            let (Some(provider), Some(breaker)) = (self.providers.get(&id), self.breakers.get(&id))
            else {
                continue;
            };
            statuses.push(ProviderStatus {
                provider: id,
                kind: provider.kind(),
                available: provider.is_available().await,
                in_priority: self.priority.contains(&id),
                breaker: breaker_snapshot(breaker),
                capabilities: provider.capabilities(),
            });
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::testing::{voice, Behaviour, FakeProvider};
    use crate::utils::CircuitBreakerState;
    use std::time::Duration;

    fn config(priority: Vec<ProviderId>) -> ResolverConfig {
        ResolverConfig {
            priority,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }

    fn resolver(
        cloud: FakeProvider,
        local: FakeProvider,
    ) -> (ProviderResolver, Arc<FakeProvider>, Arc<FakeProvider>) {
        let cloud = Arc::new(cloud);
        let local = Arc::new(local);
        let providers: Vec<Arc<dyn TtsProvider>> = vec![cloud.clone(), local.clone()];
        let resolver = ProviderResolver::new(
            providers,
            &config(vec![ProviderId::Cloud, ProviderId::Local]),
        )
        .unwrap();
        (resolver, cloud, local)
    }

    async fn convert(
        resolver: &ProviderResolver,
        requested: &Voice,
        output: &Path,
        preferred: Option<ProviderId>,
    ) -> Result<SynthesisOutput> {
        resolver
            .convert_with_fallback(
                FallbackRequest {
                    text: "Hello world.",
                    voice: requested,
                    params: &SynthesisParams::default(),
                    output,
                    preferred,
                    exclusive: false,
                },
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn test_first_available_provider_wins() {
        let (resolver, cloud, local) =
            resolver(FakeProvider::new(ProviderId::Cloud), FakeProvider::new(ProviderId::Local));
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        let output = convert(&resolver, &requested, &dir.path().join("a.mp3"), None)
            .await
            .unwrap();
        assert_eq!(output.provider, ProviderId::Cloud);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_never_invoked() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).unavailable(),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        let output = convert(&resolver, &requested, &dir.path().join("a.mp3"), Some(ProviderId::Cloud))
            .await
            .unwrap();
        assert_eq!(output.provider, ProviderId::Local);
        assert_eq!(cloud.calls(), 0);
        assert_eq!(resolver.candidates(Some(ProviderId::Cloud)).await, vec![ProviderId::Local]);
    }

    #[tokio::test]
    async fn test_preferred_provider_goes_first_without_reordering() {
        let (resolver, cloud, local) =
            resolver(FakeProvider::new(ProviderId::Cloud), FakeProvider::new(ProviderId::Local));
        assert_eq!(
            resolver.candidates(Some(ProviderId::Local)).await,
            vec![ProviderId::Local, ProviderId::Cloud]
        );

        let dir = tempfile::tempdir().unwrap();
        let requested = voice("local-en-a", "en-US", ProviderId::Local);
        let output = convert(&resolver, &requested, &dir.path().join("a.wav"), Some(ProviderId::Local))
            .await
            .unwrap();
        assert_eq!(output.provider, ProviderId::Local);
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_substitutes_voice() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-fr-a", "fr-FR", ProviderId::Cloud);

        convert(&resolver, &requested, &dir.path().join("a.wav"), None)
            .await
            .unwrap();
        assert_eq!(cloud.calls(), 1);
        let sent = local.requests();
        assert_eq!(sent[0].voice.id, "local-fr-a");
        assert_eq!(sent[0].voice.provider, ProviderId::Local);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_threshold_and_skips_provider() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);
        let output = dir.path().join("a.wav");

        for _ in 0..5 {
            let result = convert(&resolver, &requested, &output, None).await.unwrap();
            assert_eq!(result.provider, ProviderId::Local);
        }
        assert_eq!(cloud.calls(), 5);
        assert_eq!(
            resolver.breaker_snapshot(ProviderId::Cloud).unwrap().state,
            CircuitBreakerState::Open
        );

        // Sixth call short-circuits the open breaker.
        let result = convert(&resolver, &requested, &output, None).await.unwrap();
        assert_eq!(result.provider, ProviderId::Local);
        assert_eq!(cloud.calls(), 5);
        assert_eq!(local.calls(), 6);

        // Recovery: after the timeout one trial call reaches the provider.
        cloud.set_behaviour(Behaviour::Echo);
        tokio::time::advance(Duration::from_secs(60)).await;
        let result = convert(&resolver, &requested, &output, None).await.unwrap();
        assert_eq!(result.provider, ProviderId::Cloud);
        assert_eq!(cloud.calls(), 6);
        let snapshot = resolver.breaker_snapshot(ProviderId::Cloud).unwrap();
        assert_eq!(snapshot.state, CircuitBreakerState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_call_reopens_breaker() {
        let (resolver, cloud, _local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);
        let output = dir.path().join("a.wav");

        for _ in 0..5 {
            convert(&resolver, &requested, &output, None).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        convert(&resolver, &requested, &output, None).await.unwrap();
        assert_eq!(cloud.calls(), 6);
        assert_eq!(
            resolver.breaker_snapshot(ProviderId::Cloud).unwrap().state,
            CircuitBreakerState::Open
        );

        convert(&resolver, &requested, &output, None).await.unwrap();
        assert_eq!(cloud.calls(), 6);
    }

    #[tokio::test]
    async fn test_rejections_never_touch_breakers() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::RejectInput),
            FakeProvider::new(ProviderId::Local).with_behaviour(Behaviour::RejectInput),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        for _ in 0..50 {
            let err = convert(&resolver, &requested, &dir.path().join("a.mp3"), None)
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(cloud.calls(), 50);
        assert_eq!(local.calls(), 50);
        for id in ProviderId::ALL {
            let snapshot = resolver.breaker_snapshot(id).unwrap();
            assert_eq!(snapshot.failure_count, 0);
            assert_eq!(snapshot.state, CircuitBreakerState::Closed);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_names_every_provider() {
        let (resolver, _cloud, _local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local).with_behaviour(Behaviour::ServiceError),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        let err = convert(&resolver, &requested, &dir.path().join("a.mp3"), None)
            .await
            .unwrap_err();
        match err {
            TtsError::AllProvidersFailed { attempts } => {
                let order: Vec<ProviderId> = attempts.iter().map(|a| a.provider).collect();
                assert_eq!(order, vec![ProviderId::Cloud, ProviderId::Local]);
                assert!(attempts.iter().all(|a| a.kind == ErrorKind::Service));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_available_provider() {
        let (resolver, _cloud, _local) = resolver(
            FakeProvider::new(ProviderId::Cloud).unavailable(),
            FakeProvider::new(ProviderId::Local).unavailable(),
        );
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);
        let err = convert(&resolver, &requested, Path::new("unused.mp3"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::NoProviderAvailable));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (resolver, cloud, _local) =
            resolver(FakeProvider::new(ProviderId::Cloud), FakeProvider::new(ProviderId::Local));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        let err = resolver
            .convert_with_fallback(
                FallbackRequest {
                    text: "Hello.",
                    voice: &requested,
                    params: &SynthesisParams::default(),
                    output: Path::new("unused.mp3"),
                    preferred: None,
                    exclusive: false,
                },
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Cancelled));
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn test_markup_only_for_capable_provider() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        resolver
            .convert_with_fallback(
                FallbackRequest {
                    text: "Title\n\nBody.",
                    voice: &requested,
                    params: &SynthesisParams::new(10, 0, 0),
                    output: &dir.path().join("a.wav"),
                    preferred: None,
                    exclusive: false,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(cloud.requests()[0].text.starts_with("<speak>"));
        assert_eq!(local.requests()[0].text, "Title. Body.");
    }

    #[tokio::test]
    async fn test_exclusive_request_does_not_fall_back() {
        let (resolver, cloud, local) = resolver(
            FakeProvider::new(ProviderId::Cloud).with_behaviour(Behaviour::ServiceError),
            FakeProvider::new(ProviderId::Local),
        );
        let dir = tempfile::tempdir().unwrap();
        let requested = voice("cloud-en-a", "en-US", ProviderId::Cloud);

        let err = resolver
            .convert_with_fallback(
                FallbackRequest {
                    text: "Hello.",
                    voice: &requested,
                    params: &SynthesisParams::default(),
                    output: &dir.path().join("a.mp3"),
                    preferred: Some(ProviderId::Cloud),
                    exclusive: true,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            TtsError::AllProvidersFailed { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].provider, ProviderId::Cloud);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_params_refused_without_provider_call() {
        let (resolver, cloud, local) =
            resolver(FakeProvider::new(ProviderId::Cloud), FakeProvider::new(ProviderId::Local));
        let requested = voice("local-en-a", "en-US", ProviderId::Local);

        let err = resolver
            .convert_with_fallback(
                FallbackRequest {
                    text: "Hello.",
                    voice: &requested,
                    params: &SynthesisParams::new(i32::MAX, 0, i32::MIN),
                    output: Path::new("unused.wav"),
                    preferred: None,
                    exclusive: false,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::ParameterOutOfRange { name: "rate", .. }));
        assert_eq!(cloud.calls() + local.calls(), 0);
        for id in ProviderId::ALL {
            assert_eq!(resolver.breaker_snapshot(id).unwrap().failure_count, 0);
        }
    }

    #[tokio::test]
    async fn test_voice_catalog() {
        let (resolver, _cloud, _local) = resolver(
            FakeProvider::new(ProviderId::Cloud),
            FakeProvider::new(ProviderId::Local).unavailable(),
        );

        let all = resolver.get_all_voices(None).await;
        let names: Vec<&str> = all.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["cloud-en-a", "cloud-fr-a"]);

        assert_eq!(resolver.get_all_voices(Some("fr")).await.len(), 1);
        assert!(resolver
            .get_voices_by_kind(ProviderKind::Offline, None)
            .await
            .is_empty());
        assert_eq!(
            resolver.find_voice("cloud-fr-a", None).await.unwrap().provider,
            ProviderId::Cloud
        );
        assert!(resolver.find_voice("bad-voice-id", None).await.is_none());
    }

    #[tokio::test]
    async fn test_statuses_report_breakers() {
        let (resolver, _cloud, _local) =
            resolver(FakeProvider::new(ProviderId::Cloud), FakeProvider::new(ProviderId::Local).unavailable());
        let statuses = resolver.statuses().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].provider, ProviderId::Cloud);
        assert!(statuses[0].available);
        assert!(!statuses[1].available);
        assert_eq!(statuses[1].breaker.state, CircuitBreakerState::Closed);
    }

    #[test]
    fn test_priority_skips_disabled_providers() {
        let cloud: Arc<dyn TtsProvider> = Arc::new(FakeProvider::new(ProviderId::Cloud));
        let resolver = ProviderResolver::new(
            vec![cloud],
            &config(vec![ProviderId::Local, ProviderId::Cloud, ProviderId::Cloud]),
        )
        .unwrap();
        assert_eq!(resolver.priority(), &[ProviderId::Cloud]);

        assert!(ProviderResolver::new(vec![], &config(vec![ProviderId::Cloud])).is_err());
    }
}
