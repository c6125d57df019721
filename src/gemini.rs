use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, error};

use crate::error::ProviderError;
use crate::models::StoryDraft;
use crate::prompts::{build_draft_instruction, story_draft_gemini_schema, DRAFT_REQUEST};
use crate::providers::{DraftBrief, ImageData, ImageProvider, ReferenceSupport, StoryWriter};

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(body: &Value) -> String {
    let mut copy = body.clone();
    truncate_base64_in_json(&mut copy);
    copy.to_string()
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String, base_url: String, text_model: String, image_model: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, api_key, base_url, text_model, image_model }
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn generate_content(&self, model: &str, request_body: &Value) -> Result<GeminiResponse, ProviderError> {
        let url = self.model_url(model);
        info!(%url, "🔗 Calling Gemini");
        tracing::debug!("📤 Request body: {}", loggable(request_body));

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request_body)
            .send()
            .await?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await?;
        if !status.is_success() {
            error!("❌ Gemini API error response: {}", response_text);
            return Err(ProviderError::Api { status: status.as_u16(), body: response_text });
        }

        let value: Value = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(format!("parse error: {e}")))?;
        tracing::debug!("📥 Raw Gemini response: {}", loggable(&value));

        serde_json::from_value(value).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StoryWriter for GeminiClient {
    async fn draft_story(&self, brief: &DraftBrief<'_>) -> Result<StoryDraft, ProviderError> {
        info!(model = %self.text_model, "⏳ Drafting story with Gemini");
        let request_body = json!({
            "systemInstruction": { "parts": [{ "text": build_draft_instruction(brief) }] },
            "contents": [{ "role": "user", "parts": [{ "text": DRAFT_REQUEST }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": story_draft_gemini_schema(),
                "temperature": 0.7
            }
        });

        let parsed = self.generate_content(&self.text_model, &request_body).await?;
        let text = extract_first_text(&parsed).ok_or(ProviderError::MissingOutput("text"))?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Decode(format!("draft does not match schema: {e}")))
    }
}

#[async_trait]
impl ImageProvider for GeminiClient {
    fn reference_support(&self) -> ReferenceSupport {
        ReferenceSupport::MultiImage
    }

    async fn generate(&self, prompt: &str, references: &[ImageData]) -> Result<ImageData, ProviderError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut parts: Vec<Value> = references
            .iter()
            .map(|r| json!({ "inlineData": { "mimeType": r.mime_type, "data": engine.encode(&r.bytes) } }))
            .collect();
        parts.push(json!({ "text": prompt }));

        let request_body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });

        info!(model = %self.image_model, references = references.len(), "🎨 Generating image with Gemini");
        let parsed = self.generate_content(&self.image_model, &request_body).await?;
        let inline = extract_first_image(&parsed).ok_or_else(|| {
            info!("⚠️ No image data found in API response");
            ProviderError::MissingOutput("image data")
        })?;
        info!("🖼️ Extracted {} image from API response ({} chars)", inline.mime_type, inline.data.len());

        let bytes = engine
            .decode(&inline.data)
            .map_err(|e| ProviderError::Decode(format!("invalid base64 image: {e}")))?;
        Ok(ImageData { bytes: bytes.into(), mime_type: inline.mime_type.clone() })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image(resp: &GeminiResponse) -> Option<&InlineData> {
    resp.candidates
        .iter()
        .flat_map(|c| &c.content.parts)
        .find_map(|p| match p {
            Part::Inline { inline_data } => Some(inline_data),
            _ => None,
        })
}

fn extract_first_text(resp: &GeminiResponse) -> Option<String> {
    resp.candidates
        .iter()
        .flat_map(|c| &c.content.parts)
        .find_map(|p| match p {
            Part::Text { text } => Some(text.trim().to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_image_after_text_part() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your picture" },
                    { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                ]}
            }]
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let img = extract_first_image(&resp).unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, "aGVsbG8=");
        assert_eq!(extract_first_text(&resp).as_deref(), Some("Here is your picture"));
    }

    #[test]
    fn empty_candidates_yield_nothing() {
        let resp: GeminiResponse = serde_json::from_value(json!({ "promptFeedback": {} })).unwrap();
        assert!(extract_first_image(&resp).is_none());
        assert!(extract_first_text(&resp).is_none());
    }

    #[test]
    fn trailing_slash_in_base_url_is_dropped() {
        let client = GeminiClient::new(
            Client::new(),
            "k".into(),
            "https://generativelanguage.googleapis.com/v1beta/".into(),
            "text".into(),
            "image".into(),
        );
        assert_eq!(
            client.model_url("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn long_base64_is_truncated_for_logs() {
        let data = "A".repeat(400);
        let logged = loggable(&json!({ "parts": [{ "inlineData": { "data": data, "mimeType": "image/png" } }] }));
        assert!(logged.contains("[truncated 350 chars]"));
        assert!(!logged.contains(&"A".repeat(100)));
    }
}
