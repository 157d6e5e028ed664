use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tracing::error;

use crate::{
    attachment::{AttachmentMode, NormalizedAttachment},
    config::{Configuration, Provider},
};

mod chat;
mod generative;

pub use chat::ChatCompletion;
pub use generative::Generative;

/// Outbound provider calls that run longer than this are treated as faults.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Uniform provider result: exactly one of the provider's text (200) or the
/// configured error message (500).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    pub status_code: u16,
    pub text: String,
}

impl AiReply {
    pub fn success(text: String) -> Self {
        Self {
            status_code: 200,
            text,
        }
    }

    pub fn failure(error_message: &str) -> Self {
        Self {
            status_code: 500,
            text: error_message.to_string(),
        }
    }
}

/// One deployed generation strategy. Selected at process construction,
/// never swapped at runtime.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Which attachment normalization this strategy consumes.
    fn attachment_mode(&self) -> AttachmentMode;

    /// Never fails outward: any provider fault becomes a 500 reply carrying
    /// the configured error message.
    async fn generate_response(
        &self,
        user_content: &str,
        user_name: &str,
        attachments: &[NormalizedAttachment],
    ) -> AiReply;
}

pub fn load(config: &Configuration, api_key: &str) -> Box<dyn ResponseGenerator> {
    match config.provider {
        Provider::Grok => Box::new(ChatCompletion::new(config, api_key)),
        Provider::Gemini => Box::new(Generative::new(config, api_key)),
    }
}

/// Collapses a provider round trip into the `(status, text)` contract.
/// Faults and timeouts are logged here and never surfaced to the chat.
pub(crate) async fn run_to_reply(
    request: impl Future<Output = anyhow::Result<String>> + Send,
    error_message: &str,
) -> AiReply {
    match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
        Ok(Ok(text)) => AiReply::success(text),
        Ok(Err(err)) => {
            error!("provider request failed: {err:#}");
            AiReply::failure(error_message)
        }
        Err(_) => {
            error!(
                "provider request timed out after {}s",
                REQUEST_TIMEOUT.as_secs()
            );
            AiReply::failure(error_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_selects_the_configured_strategy() {
        let grok = Configuration::default();
        assert_eq!(load(&grok, "key").attachment_mode(), AttachmentMode::Image);

        let gemini = Configuration {
            provider: Provider::Gemini,
            attachment_mode: AttachmentMode::Blob,
            ..Configuration::default()
        };
        assert_eq!(load(&gemini, "key").attachment_mode(), AttachmentMode::Blob);
    }

    #[tokio::test]
    async fn run_to_reply_collapses_faults() {
        let reply = run_to_reply(async { anyhow::bail!("boom") }, "エラーが発生しました。").await;
        assert_eq!(reply.status_code, 500);
        assert_eq!(reply.text, "エラーが発生しました。");
    }

    #[tokio::test]
    async fn run_to_reply_passes_success_through() {
        let reply = run_to_reply(async { Ok("やあ".to_string()) }, "unused").await;
        assert_eq!(reply, AiReply::success("やあ".into()));
    }
}
