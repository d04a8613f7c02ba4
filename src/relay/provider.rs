//! Upstream provider discriminants.
//!
//! One variant per supported vendor. Adding a provider means adding a
//! variant here and one arm in [`crate::relay::registry::AdaptorRegistry`];
//! existing variants are never touched.

use serde::{Deserialize, Serialize};

/// Which upstream AI vendor a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Anthropic,
    Gemini,
    DeepSeek,
    Groq,
    Mistral,
    Moonshot,
    XAi,
    Zhipu,
    Baichuan,
    MiniMax,
    Doubao,
    Qwen,
    StepFun,
    OpenRouter,
    TogetherAi,
    SiliconFlow,
    LingYiWanWu,
    Novita,
}

impl ProviderKind {
    /// Every known discriminant, in registry order.
    pub const ALL: [ProviderKind; 20] = [
        ProviderKind::OpenAi,
        ProviderKind::Azure,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::DeepSeek,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::Moonshot,
        ProviderKind::XAi,
        ProviderKind::Zhipu,
        ProviderKind::Baichuan,
        ProviderKind::MiniMax,
        ProviderKind::Doubao,
        ProviderKind::Qwen,
        ProviderKind::StepFun,
        ProviderKind::OpenRouter,
        ProviderKind::TogetherAi,
        ProviderKind::SiliconFlow,
        ProviderKind::LingYiWanWu,
        ProviderKind::Novita,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::Moonshot => "moonshot",
            Self::XAi => "xai",
            Self::Zhipu => "zhipu",
            Self::Baichuan => "baichuan",
            Self::MiniMax => "minimax",
            Self::Doubao => "doubao",
            Self::Qwen => "qwen",
            Self::StepFun => "stepfun",
            Self::OpenRouter => "openrouter",
            Self::TogetherAi => "togetherai",
            Self::SiliconFlow => "siliconflow",
            Self::LingYiWanWu => "lingyiwanwu",
            Self::Novita => "novita",
        }
    }

    /// Base URL used when the channel configuration supplies none.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            // Azure has no meaningful default; the resource endpoint is
            // always channel-specific.
            Self::Azure => "",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Groq => "https://api.groq.com/openai",
            Self::Mistral => "https://api.mistral.ai",
            Self::Moonshot => "https://api.moonshot.cn",
            Self::XAi => "https://api.x.ai",
            Self::Zhipu => "https://open.bigmodel.cn",
            Self::Baichuan => "https://api.baichuan-ai.com",
            Self::MiniMax => "https://api.minimax.chat",
            Self::Doubao => "https://ark.cn-beijing.volces.com",
            Self::Qwen => "https://dashscope.aliyuncs.com",
            Self::StepFun => "https://api.stepfun.com",
            Self::OpenRouter => "https://openrouter.ai/api",
            Self::TogetherAi => "https://api.together.xyz",
            Self::SiliconFlow => "https://api.siliconflow.cn",
            Self::LingYiWanWu => "https://api.lingyiwanwu.com",
            Self::Novita => "https://api.novita.ai",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::error::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::error::RelayError::InvalidProvider(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(ids.len(), ProviderKind::ALL.len());
    }

    #[test]
    fn from_str_round_trips() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("unknown-vendor".parse::<ProviderKind>().is_err());
    }
}
