use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::TtsError;

/// The closed set of synthesis backends this crate can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Cloud,
    Local,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Cloud, ProviderId::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Cloud => "cloud",
            ProviderId::Local => "local",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" | "gcp" => Ok(ProviderId::Cloud),
            "local" | "offline" | "espeak" => Ok(ProviderId::Local),
            _ => Err(TtsError::UnknownProvider(s.to_string())),
        }
    }
}

/// Whether a provider needs the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Network,
    Offline,
}
