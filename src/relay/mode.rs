//! Operation modes the gateway can relay.

use serde::{Deserialize, Serialize};

/// The kind of AI capability an inbound call requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    ChatCompletions,
    Embeddings,
    ImagesGenerations,
    AudioTranscription,
    Rerank,
    Moderations,
}

impl RelayMode {
    pub const ALL: [RelayMode; 6] = [
        RelayMode::ChatCompletions,
        RelayMode::Embeddings,
        RelayMode::ImagesGenerations,
        RelayMode::AudioTranscription,
        RelayMode::Rerank,
        RelayMode::Moderations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat_completions",
            Self::Embeddings => "embeddings",
            Self::ImagesGenerations => "images_generations",
            Self::AudioTranscription => "audio_transcription",
            Self::Rerank => "rerank",
            Self::Moderations => "moderations",
        }
    }
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for mode in RelayMode::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json.trim_matches('"'), mode.as_str());
        }
    }
}
