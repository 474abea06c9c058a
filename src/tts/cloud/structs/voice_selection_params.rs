use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[allow(non_snake_case)]
pub struct VoiceSelectionParams {
    pub languageCode: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssmlGender: Option<String>,
}
