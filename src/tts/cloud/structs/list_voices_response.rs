use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ListVoicesResponse {
    #[serde(default)]
    pub voices: Vec<CloudVoice>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[allow(non_snake_case)]
pub struct CloudVoice {
    #[serde(default)]
    pub languageCodes: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub ssmlGender: String,
    #[serde(default)]
    pub naturalSampleRateHertz: u32,
}
