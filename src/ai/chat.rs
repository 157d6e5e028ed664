use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageUrl,
};
use async_trait::async_trait;

use crate::{
    attachment::{self, AttachmentMode, NormalizedAttachment},
    config::Configuration,
};

use super::{AiReply, ResponseGenerator};

const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";

/// Vision-capable chat-completion strategy for OpenAI-compatible endpoints.
/// Decoded images ride along as quality-85 JPEG data URLs.
pub struct ChatCompletion {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    system_prompt: String,
    error_message: String,
}

impl ChatCompletion {
    pub fn new(config: &Configuration, api_key: &str) -> Self {
        let openai_config = async_openai::config::OpenAIConfig::default()
            .with_api_base(config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE))
            .with_api_key(api_key);

        Self {
            client: async_openai::Client::with_config(openai_config),
            model: config.grok_model.clone(),
            system_prompt: config.system_prompt.clone(),
            error_message: config.error_message.clone(),
        }
    }

    async fn complete(
        &self,
        user_content: &str,
        user_name: &str,
        attachments: &[NormalizedAttachment],
    ) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(build_messages(
                &self.system_prompt,
                user_content,
                user_name,
                attachments,
            )?)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("completion response carried no content")
    }
}

#[async_trait]
impl ResponseGenerator for ChatCompletion {
    fn attachment_mode(&self) -> AttachmentMode {
        AttachmentMode::Image
    }

    async fn generate_response(
        &self,
        user_content: &str,
        user_name: &str,
        attachments: &[NormalizedAttachment],
    ) -> AiReply {
        super::run_to_reply(
            self.complete(user_content, user_name, attachments),
            &self.error_message,
        )
        .await
    }
}

fn build_messages(
    system_prompt: &str,
    user_content: &str,
    user_name: &str,
    attachments: &[NormalizedAttachment],
) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
        ChatCompletionRequestMessageContentPartText {
            text: format!("{user_name} さんからのリクエスト: {user_content}"),
        },
    )];

    for normalized in attachments {
        // this strategy only ever deploys with the image normalizer
        if let NormalizedAttachment::Image(image) = normalized {
            parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: attachment::to_data_url(image)?,
                        detail: None,
                    },
                },
            ));
        }
    }

    Ok(vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: system_prompt.to_string().into(),
            name: None,
        }),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Array(parts),
            name: None,
        }),
    ])
}
