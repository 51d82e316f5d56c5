//! Runtime settings read from the environment (and `.env`).

use crate::error::{self, Result};
use crate::provider::{ProviderConfig, ProviderType};
use crate::store::DEFAULT_CHECKPOINT_DB;
use std::path::PathBuf;

/// Highest revision ceiling accepted unless overridden
pub const DEFAULT_MAX_REVISIONS_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub provider: ProviderType,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub checkpoint_db: PathBuf,
    pub max_revisions_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderType::Gemini,
            model: None,
            base_url: None,
            temperature: 0.0,
            timeout_secs: 120,
            gemini_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            tavily_api_key: None,
            checkpoint_db: PathBuf::from(DEFAULT_CHECKPOINT_DB),
            max_revisions_limit: DEFAULT_MAX_REVISIONS_LIMIT,
        }
    }
}

impl Settings {
    /// Read `.env` if present, then the process environment
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let provider = match get("ESSAYCRAFT_PROVIDER") {
            Some(name) => ProviderType::parse(&name).ok_or_else(|| {
                error::config_invalid(format!("unknown provider '{}'", name))
                    .with_context("key", "ESSAYCRAFT_PROVIDER")
            })?,
            None => defaults.provider,
        };

        Ok(Self {
            provider,
            model: get("ESSAYCRAFT_MODEL"),
            base_url: get("ESSAYCRAFT_BASE_URL"),
            temperature: parse_or(get("ESSAYCRAFT_TEMPERATURE"), "ESSAYCRAFT_TEMPERATURE", defaults.temperature)?,
            timeout_secs: parse_or(get("ESSAYCRAFT_TIMEOUT_SECS"), "ESSAYCRAFT_TIMEOUT_SECS", defaults.timeout_secs)?,
            gemini_api_key: get("GEMINI_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            tavily_api_key: get("TAVILY_API_KEY"),
            checkpoint_db: get("ESSAYCRAFT_CHECKPOINT_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_db),
            max_revisions_limit: parse_or(
                get("ESSAYCRAFT_MAX_REVISIONS_LIMIT"),
                "ESSAYCRAFT_MAX_REVISIONS_LIMIT",
                defaults.max_revisions_limit,
            )?,
        })
    }

    /// Provider configuration for the selected backend
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let missing = |key: &'static str| {
            error::config_invalid(format!("{} is not set", key)).with_context("key", key)
        };

        let config = match self.provider {
            ProviderType::Gemini => ProviderConfig::gemini(
                self.gemini_api_key.clone().ok_or_else(|| missing("GEMINI_API_KEY"))?,
            ),
            ProviderType::OpenAI => ProviderConfig::openai(
                self.openai_api_key.clone().ok_or_else(|| missing("OPENAI_API_KEY"))?,
            ),
            ProviderType::Anthropic => ProviderConfig::anthropic(
                self.anthropic_api_key.clone().ok_or_else(|| missing("ANTHROPIC_API_KEY"))?,
            ),
            ProviderType::Local => {
                let base_url = self
                    .base_url
                    .clone()
                    .ok_or_else(|| missing("ESSAYCRAFT_BASE_URL"))?;
                let model = self.model.clone().ok_or_else(|| missing("ESSAYCRAFT_MODEL"))?;
                ProviderConfig::local(base_url, model)
            }
        };

        let mut config = config.with_timeout(self.timeout_secs);
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    pub fn tavily_api_key(&self) -> Result<&str> {
        self.tavily_api_key.as_deref().ok_or_else(|| {
            error::config_invalid("TAVILY_API_KEY is not set").with_context("key", "TAVILY_API_KEY")
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw.parse().map_err(|_| {
            error::config_invalid(format!("{} has invalid value '{}'", key, raw)).with_context("key", key)
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.provider, ProviderType::Gemini);
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.checkpoint_db, PathBuf::from("checkpoints.db"));
        assert_eq!(s.max_revisions_limit, 5);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("ESSAYCRAFT_PROVIDER", "anthropic"),
            ("ESSAYCRAFT_MODEL", "claude-haiku"),
            ("ESSAYCRAFT_TEMPERATURE", "0.7"),
            ("ESSAYCRAFT_MAX_REVISIONS_LIMIT", "8"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("ESSAYCRAFT_CHECKPOINT_DB", "/tmp/runs.db"),
        ])
        .unwrap();

        assert_eq!(s.provider, ProviderType::Anthropic);
        assert_eq!(s.temperature, 0.7);
        assert_eq!(s.max_revisions_limit, 8);

        let config = s.provider_config().unwrap();
        assert_eq!(config.default_model.as_deref(), Some("claude-haiku"));
        assert_eq!(config.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn test_missing_key_is_config_invalid() {
        let s = settings(&[("GEMINI_API_KEY", "  ")]).unwrap();
        let err = s.provider_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.context().contains(&("key", "GEMINI_API_KEY".to_string())));

        assert_eq!(s.tavily_api_key().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_invalid_values() {
        let err = settings(&[("ESSAYCRAFT_PROVIDER", "bard")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = settings(&[("ESSAYCRAFT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_local_provider_needs_url_and_model() {
        let s = settings(&[("ESSAYCRAFT_PROVIDER", "local")]).unwrap();
        assert!(s.provider_config().is_err());

        let s = settings(&[
            ("ESSAYCRAFT_PROVIDER", "local"),
            ("ESSAYCRAFT_BASE_URL", "http://localhost:11434/v1"),
            ("ESSAYCRAFT_MODEL", "llama3"),
        ])
        .unwrap();
        let config = s.provider_config().unwrap();
        assert_eq!(config.provider_type, ProviderType::Local);
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, Some(120));
    }
}
