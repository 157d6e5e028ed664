use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    attachment::{self, AttachmentMode, NormalizedAttachment},
    config::Configuration,
};

use super::{AiReply, ResponseGenerator};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Single-shot generative-model strategy. Sends one concatenated prompt to
/// the `generateContent` endpoint; decoded images ride along as inline JPEG
/// parts, opaque blobs pass through with their declared media type.
pub struct Generative {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    error_message: String,
    attachment_mode: AttachmentMode,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl RequestPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline(mime_type: String, data: String) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData { mime_type, data }),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl Generative {
    pub fn new(config: &Configuration, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
            api_key: api_key.to_string(),
            model: config.gemini_model.clone(),
            system_prompt: config.system_prompt.clone(),
            error_message: config.error_message.clone(),
            attachment_mode: config.attachment_mode,
        }
    }

    async fn complete(
        &self,
        user_content: &str,
        user_name: &str,
        attachments: &[NormalizedAttachment],
    ) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: build_parts(
                    self.attachment_mode,
                    &self.system_prompt,
                    user_content,
                    user_name,
                    attachments,
                )?,
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to send generation request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("generation endpoint returned {status}: {body}");
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .context("failed to parse generation response")?;

        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        if text.is_empty() {
            bail!("generation response carried no text");
        }
        Ok(text)
    }
}

#[async_trait]
impl ResponseGenerator for Generative {
    fn attachment_mode(&self) -> AttachmentMode {
        self.attachment_mode
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

fn build_parts(
    mode: AttachmentMode,
    system_prompt: &str,
    user_content: &str,
    user_name: &str,
    attachments: &[NormalizedAttachment],
) -> Result<Vec<RequestPart>> {
    let mut parts = vec![RequestPart::text(build_prompt(
        mode,
        system_prompt,
        user_content,
        user_name,
        attachments.len(),
    ))];

    for normalized in attachments {
        match normalized {
            NormalizedAttachment::Image(image) => parts.push(RequestPart::inline(
                "image/jpeg".into(),
                STANDARD.encode(attachment::to_jpeg(image)?),
            )),
            NormalizedAttachment::Blob { media_type, data } => {
                parts.push(RequestPart::inline(media_type.clone(), data.clone()));
            }
        }
    }

    Ok(parts)
}

fn build_prompt(
    mode: AttachmentMode,
    system_prompt: &str,
    user_content: &str,
    user_name: &str,
    attachment_count: usize,
) -> String {
    match mode {
        AttachmentMode::Image => {
            format!("{system_prompt}\n{user_name} さんからのリクエスト: {user_content}")
        }
        AttachmentMode::Blob if attachment_count > 0 => {
            format!("{system_prompt}\n{user_content}\n(添付ファイル: {attachment_count}件)")
        }
        AttachmentMode::Blob => format!("{system_prompt}\n{user_content}"),
    }
}
