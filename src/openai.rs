//! OpenAI REST client: structured chat drafting, image generation/edits
//! and speech synthesis.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::ProviderError;
use crate::models::StoryDraft;
use crate::prompts::{build_draft_instruction, story_draft_json_schema, DRAFT_REQUEST};
use crate::providers::{DraftBrief, ImageData, ImageProvider, Narrator, ReferenceSupport, StoryWriter};

/// Image models with differing request shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiImageModel {
    /// `gpt-image-1` via `/images/edits`, accepts several reference images.
    GptImage,
    /// `dall-e-3` via `/images/generations`, prompt only.
    DallE3,
}

impl OpenAiImageModel {
    fn name(self) -> &'static str {
        match self {
            Self::GptImage => "gpt-image-1",
            Self::DallE3 => "dall-e-3",
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self { client, api_key, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn checked(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("❌ OpenAI API error response: status={} body={}", status, body);
        Err(ProviderError::Api { status: status.as_u16(), body })
    }
}

/// Story drafting through chat completions with a strict JSON schema.
pub struct OpenAiWriter {
    api: OpenAiClient,
    model: String,
}

impl OpenAiWriter {
    pub fn new(api: OpenAiClient, model: String) -> Self {
        Self { api, model }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn parse_draft(resp: ChatResponse) -> Result<StoryDraft, ProviderError> {
    let message = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or(ProviderError::MissingOutput("choices"))?;
    if let Some(refusal) = message.refusal {
        return Err(ProviderError::Decode(format!("model refused: {refusal}")));
    }
    let content = message.content.ok_or(ProviderError::MissingOutput("message content"))?;
    serde_json::from_str(&content).map_err(|e| ProviderError::Decode(format!("draft does not match schema: {e}")))
}

#[async_trait]
impl StoryWriter for OpenAiWriter {
    async fn draft_story(&self, brief: &DraftBrief<'_>) -> Result<StoryDraft, ProviderError> {
        info!(model = %self.model, "⏳ Drafting story with OpenAI");
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": build_draft_instruction(brief) },
                { "role": "user", "content": DRAFT_REQUEST }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "story_draft",
                    "strict": true,
                    "schema": story_draft_json_schema()
                }
            }
        });

        let response = self.api.client
            .post(self.api.url("chat/completions"))
            .bearer_auth(&self.api.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: ChatResponse = OpenAiClient::checked(response).await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        parse_draft(parsed)
    }
}

pub struct OpenAiImages {
    api: OpenAiClient,
    model: OpenAiImageModel,
}

impl OpenAiImages {
    pub fn new(api: OpenAiClient, model: OpenAiImageModel) -> Self {
        Self { api, model }
    }

    fn decode(resp: ImagesResponse) -> Result<ImageData, ProviderError> {
        let b64 = resp
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or(ProviderError::MissingOutput("b64_json image"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| ProviderError::Decode(format!("invalid base64 image: {e}")))?;
        Ok(ImageData::new(bytes))
    }

    async fn generations(&self, prompt: &str) -> Result<ImagesResponse, ProviderError> {
        let mut body = json!({
            "model": self.model.name(),
            "prompt": prompt,
            "size": "1024x1024",
            "n": 1
        });
        // gpt-image-1 always answers in base64 and rejects response_format
        if self.model == OpenAiImageModel::DallE3 {
            body["quality"] = json!("standard");
            body["response_format"] = json!("b64_json");
        }
        let response = self.api.client
            .post(self.api.url("images/generations"))
            .bearer_auth(&self.api.api_key)
            .json(&body)
            .send()
            .await?;
        OpenAiClient::checked(response).await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn edits(&self, prompt: &str, references: &[ImageData]) -> Result<ImagesResponse, ProviderError> {
        let mut form = multipart::Form::new()
            .text("model", self.model.name())
            .text("prompt", prompt.to_string())
            .text("size", "1024x1024")
            .text("n", "1");
        for (i, reference) in references.iter().enumerate() {
            let part = multipart::Part::bytes(reference.bytes.to_vec())
                .file_name(format!("reference_{i}{}", reference.extension()))
                .mime_str(&reference.mime_type)?;
            form = form.part("image[]", part);
        }
        let response = self.api.client
            .post(self.api.url("images/edits"))
            .bearer_auth(&self.api.api_key)
            .multipart(form)
            .send()
            .await?;
        OpenAiClient::checked(response).await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    fn reference_support(&self) -> ReferenceSupport {
        match self.model {
            OpenAiImageModel::GptImage => ReferenceSupport::MultiImage,
            OpenAiImageModel::DallE3 => ReferenceSupport::TextOnly,
        }
    }

    async fn generate(&self, prompt: &str, references: &[ImageData]) -> Result<ImageData, ProviderError> {
        info!(model = self.model.name(), references = references.len(), "🎨 Generating image with OpenAI");
        let resp = if references.is_empty() || self.model == OpenAiImageModel::DallE3 {
            self.generations(prompt).await?
        } else {
            self.edits(prompt, references).await?
        };
        Self::decode(resp)
    }
}

pub struct OpenAiNarrator {
    api: OpenAiClient,
    model: String,
    voice: String,
}

impl OpenAiNarrator {
    pub fn new(api: OpenAiClient, model: String, voice: String) -> Self {
        Self { api, model, voice }
    }
}

#[async_trait]
impl Narrator for OpenAiNarrator {
    async fn narrate(&self, text: &str) -> Result<Bytes, ProviderError> {
        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3"
        });
        let response = self.api.client
            .post(self.api.url("audio/speech"))
            .bearer_auth(&self.api.api_key)
            .json(&body)
            .send()
            .await?;
        let audio = OpenAiClient::checked(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::MissingOutput("audio"));
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizKind;

    fn chat(content: serde_json::Value) -> ChatResponse {
        serde_json::from_value(json!({ "choices": [{ "message": content }] })).unwrap()
    }

    #[test]
    fn parses_structured_draft_content() {
        let draft = json!({
            "title": "t", "summary": "s", "style_guide": "g",
            "character_bible": "c", "anchor_prompt": "a",
            "scenes": [
                { "scene_no": 1, "text": "x", "image_prompt": "p", "quiz": null },
                { "scene_no": 3, "text": "y", "image_prompt": "q", "quiz": {
                    "type": "short_answer", "question": "?", "answer": "2",
                    "correct_msg": "ok", "wrong_msg": "no" } }
            ]
        });
        let parsed = parse_draft(chat(json!({ "content": draft.to_string() }))).unwrap();
        assert_eq!(parsed.scenes.len(), 2);
        assert_eq!(parsed.scenes[1].quiz.as_ref().unwrap().kind, QuizKind::ShortAnswer);
        assert_eq!(parsed.scenes[0].image_url, "");
    }

    #[test]
    fn refusal_is_an_error() {
        let err = parse_draft(chat(json!({ "content": null, "refusal": "cannot help" }))).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(msg) if msg.contains("cannot help")));
    }

    #[test]
    fn malformed_content_is_a_decode_error() {
        let err = parse_draft(chat(json!({ "content": "{\"title\": 1}" }))).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn no_choices_is_missing_output() {
        let resp: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(parse_draft(resp), Err(ProviderError::MissingOutput("choices"))));
    }

    #[test]
    fn images_response_decodes_base64() {
        let resp: ImagesResponse = serde_json::from_value(json!({ "data": [{ "b64_json": "aGVsbG8=" }] })).unwrap();
        let image = OpenAiImages::decode(resp).unwrap();
        assert_eq!(&image.bytes[..], b"hello");
    }

    #[test]
    fn dalle_is_text_only() {
        let api = OpenAiClient::new(Client::new(), "k".into(), "http://localhost".into());
        assert_eq!(OpenAiImages::new(api.clone(), OpenAiImageModel::DallE3).reference_support(), ReferenceSupport::TextOnly);
        assert_eq!(OpenAiImages::new(api, OpenAiImageModel::GptImage).reference_support(), ReferenceSupport::MultiImage);
    }
}
