use serde::Deserialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::attachment::AttachmentMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Which generation strategy this deployment talks to. Selected once at
/// startup, never switched at runtime.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Grok,
    Gemini,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Configuration {
    pub provider: Provider,
    /// Channel names permitted to trigger the bot. Matched verbatim;
    /// an empty list admits nothing.
    pub allowed_channels: HashSet<String>,
    pub system_prompt: String,
    /// Posted to the channel whenever the provider call fails.
    pub error_message: String,
    pub reaction_emoji: String,
    pub grok_model: String,
    pub gemini_model: String,
    pub attachment_mode: AttachmentMode,
    /// Overrides the strategy's canonical endpoint.
    pub api_base: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            allowed_channels: HashSet::new(),
            system_prompt: String::new(),
            error_message: "エラーが発生しました。".into(),
            reaction_emoji: "✅".into(),
            grok_model: "grok-3".into(),
            gemini_model: "gemini-1.5-flash".into(),
            attachment_mode: AttachmentMode::default(),
            api_base: None,
        }
    }
}

impl Configuration {
    const FILENAME: &str = "config.toml";

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(Self::FILENAME))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn model_name(&self) -> &str {
        match self.provider {
            Provider::Grok => &self.grok_model,
            Provider::Gemini => &self.gemini_model,
        }
    }
}
