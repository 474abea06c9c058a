use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::errors::{Result, TtsError};
use crate::tts::provider::{
    verify_output, Capabilities, Gender, SynthesisOutput, SynthesisRequest, TtsProvider, Voice,
    VoiceQuality,
};
use crate::tts::provider_id::{ProviderId, ProviderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Writes the request text as the audio payload.
    Echo,
    ServiceError,
    RejectInput,
    /// Echoes for the first `n` calls, then fails like `ServiceError`.
    FailAfter(usize),
}

/// Scriptable provider for resolver and orchestrator tests.
#[derive(Debug)]
pub struct FakeProvider {
    id: ProviderId,
    available: AtomicBool,
    capabilities: Capabilities,
    voices: Vec<Voice>,
    behaviour: Mutex<Behaviour>,
    jitter: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
}

pub fn voice(id: &str, locale: &str, provider: ProviderId) -> Voice {
    Voice {
        id: id.to_string(),
        name: id.to_string(),
        locale: locale.to_string(),
        gender: Gender::Female,
        quality: VoiceQuality::Standard,
        provider,
    }
}

impl FakeProvider {
    pub fn new(id: ProviderId) -> Self {
        let markup = id == ProviderId::Cloud;
        Self {
            id,
            available: AtomicBool::new(true),
            capabilities: Capabilities {
                rate: true,
                pitch: true,
                volume: true,
                markup,
                chunking: true,
                max_text_bytes: 10_000,
            },
            voices: vec![
                voice(&format!("{}-en-a", id), "en-US", id),
                voice(&format!("{}-fr-a", id), "fr-FR", id),
            ],
            behaviour: Mutex::new(Behaviour::Echo),
            jitter: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behaviour(self, behaviour: Behaviour) -> Self {
        *self.behaviour.lock().unwrap() = behaviour;
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn with_max_text_bytes(mut self, max_text_bytes: usize) -> Self {
        self.capabilities.max_text_bytes = max_text_bytes;
        self
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsProvider for FakeProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> ProviderKind {
        match self.id {
            ProviderId::Cloud => ProviderKind::Network,
            ProviderId::Local => ProviderKind::Offline,
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get_voices(&self, locale: Option<&str>) -> Result<Vec<Voice>> {
        Ok(self
            .voices
            .iter()
            .filter(|v| locale.map_or(true, |l| v.matches_locale(l)))
            .cloned()
            .collect())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        if self.jitter {
            let spread = request.text.bytes().map(u64::from).sum::<u64>() % 13;
            tokio::time::sleep(Duration::from_millis(spread)).await;
        }

        let behaviour = match *self.behaviour.lock().unwrap() {
            Behaviour::FailAfter(n) if call <= n => Behaviour::Echo,
            Behaviour::FailAfter(_) => Behaviour::ServiceError,
            behaviour => behaviour,
        };
        match behaviour {
            Behaviour::Echo => {
                tokio::fs::write(&request.output, request.text.as_bytes()).await?;
                verify_output(self.id, request.output.clone()).await
            }
            Behaviour::ServiceError => Err(TtsError::synthesis(self.id, "network unreachable")),
            Behaviour::RejectInput => Err(TtsError::rejected(self.id, "HTTP 400: invalid voice")),
            Behaviour::FailAfter(_) => unreachable!("resolved above"),
        }
    }
}
