// Public API for the tts-failover library

pub mod config;
pub mod errors;
pub mod trace;
pub mod tts;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use errors::{ErrorKind, Result, TtsError};
pub use tts::orchestrator::{ConversionOrchestrator, ConversionOutput, ConversionRequest};
pub use tts::provider::{SynthesisParams, TtsProvider, Voice};
pub use tts::provider_id::{ProviderId, ProviderKind};
pub use tts::resolver::{ProviderResolver, ProviderStatus};
pub use utils::{CircuitBreaker, CircuitBreakerState, get_cached_regex};
