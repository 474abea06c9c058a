use crate::tts::cloud::structs::{
    audio_config::AudioConfig, synthesis_input::SynthesisInput,
    voice_selection_params::VoiceSelectionParams,
};
use serde::{Deserialize, Serialize};

/// Example:
/// ```ignore
/// SynthesizeRequest {
///     input: SynthesisInput {
///         text: None,
///         ssml: Some(String::from("<speak>test</speak>")),
///     },
///     voice: VoiceSelectionParams {
///         languageCode: String::from("en-US"),
///         name: String::from("en-US-Wavenet-D"),
///         ssmlGender: None,
///     },
///     audioConfig: AudioConfig {
///         audioEncoding: String::from("MP3"),
///         speakingRate: None,
///         pitch: None,
///         volumeGainDb: None,
///     },
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
#[allow(non_snake_case)]
pub struct SynthesizeRequest {
    pub input: SynthesisInput,
    pub voice: VoiceSelectionParams,
    pub audioConfig: AudioConfig,
}
