use std::env;

use url::Url;

use crate::error::{ChatError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are WalkyNine, a friendly and helpful AI assistant. \
Answer clearly and concisely, and say so when you are not sure about something.";

/// Sampling parameters forwarded as `generationConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Everything the Gemini client needs to open a chat session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
    pub system_instruction: Option<String>,
    pub generation: GenerationSettings,
}

impl ClientConfig {
    /// Build the configuration from the process environment.
    ///
    /// `GEMINI_API_KEY` is required; `GEMINI_MODEL` and `GEMINI_BASE_URL`
    /// fall back to the public defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ChatError::MissingApiKey)?;

        let model = lookup("GEMINI_MODEL")
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let raw_base = lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&raw_base)?;

        Ok(Self {
            api_key,
            model,
            base_url,
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            generation: GenerationSettings::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// URL of the server-sent-events streaming endpoint for the configured model.
    pub fn stream_endpoint(&self) -> Result<Url> {
        let path = format!("v1beta/models/{}:streamGenerateContent", self.model);
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| ChatError::InvalidConfig(format!("cannot build endpoint for {}: {}", self.model, e)))?;
        url.set_query(Some("alt=sse"));
        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ChatError::InvalidConfig(format!("GEMINI_BASE_URL '{}': {}", raw, e)))?;

    if url.cannot_be_a_base() {
        return Err(ChatError::InvalidConfig(format!(
            "GEMINI_BASE_URL '{}' cannot be used as a base URL",
            raw
        )));
    }

    // Url::join replaces the last path segment unless the path ends in '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ChatError::MissingApiKey)));

        let result = ClientConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")]));
        assert!(matches!(result, Err(ChatError::MissingApiKey)));
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = ClientConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url.as_str(), "https://generativelanguage.googleapis.com/");
        assert_eq!(config.generation, GenerationSettings::default());
        assert!(config.system_instruction.unwrap().contains("WalkyNine"));
    }

    #[test]
    fn endpoint_targets_streaming_method() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
        ]))
        .unwrap();
        assert_eq!(
            config.stream_endpoint().unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn base_url_with_path_keeps_its_prefix() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_BASE_URL", "http://localhost:8080/proxy"),
        ]))
        .unwrap()
        .with_model("m");
        assert_eq!(
            config.stream_endpoint().unwrap().as_str(),
            "http://localhost:8080/proxy/v1beta/models/m:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = ClientConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_BASE_URL", "not a url"),
        ]));
        assert!(matches!(result, Err(ChatError::InvalidConfig(_))));
    }
}
