use serde::{Deserialize, Serialize};

/// Example:
/// ```ignore
/// AudioConfig {
///     audioEncoding: String::from("MP3"),
///     speakingRate: Some(1.25),
///     pitch: Some(-2.0),
///     volumeGainDb: None,
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct AudioConfig {
    pub audioEncoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speakingRate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumeGainDb: Option<f32>,
}
