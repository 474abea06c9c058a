use serde::{Deserialize, Serialize};

/// Exactly one of `text` and `ssml` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SynthesisInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssml: Option<String>,
}
