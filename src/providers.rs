//! Service seams used by the pipeline.
//!
//! Each external capability (story drafting, illustration, narration) sits
//! behind a trait so concrete clients are chosen once at start-up and test
//! doubles can stand in for them.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProviderError;
use crate::models::StoryDraft;

/// Raw image bytes plus the MIME type reported or detected for them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ImageData {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let mime_type = detect_image_mime(&bytes).to_string();
        Self { bytes, mime_type }
    }

    /// File extension (with leading dot) matching the image contents.
    pub fn extension(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(image::ImageFormat::Jpeg) => ".jpg",
            Ok(image::ImageFormat::WebP) => ".webp",
            _ => ".png",
        }
    }
}

fn detect_image_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
}

/// How a provider can use reference images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSupport {
    /// References are passed as conditioning input.
    MultiImage,
    /// Only the prompt is sent; continuity relies on prompt text.
    TextOnly,
}

/// Child profile and learning content a draft is written from.
#[derive(Debug, Clone)]
pub struct DraftBrief<'a> {
    pub child_name: &'a str,
    pub age: i32,
    pub personality: &'a str,
    pub emotion: &'a str,
    pub source_text: &'a str,
}

#[async_trait]
pub trait StoryWriter: Send + Sync {
    /// Produce a draft in the `StoryDraft` shape via structured output.
    async fn draft_story(&self, brief: &DraftBrief<'_>) -> Result<StoryDraft, ProviderError>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn reference_support(&self) -> ReferenceSupport;

    /// Generate one image. `references` is empty for text-only providers.
    async fn generate(&self, prompt: &str, references: &[ImageData]) -> Result<ImageData, ProviderError>;
}

#[async_trait]
pub trait Narrator: Send + Sync {
    /// Synthesize speech for `text`, returning mp3 bytes.
    async fn narrate(&self, text: &str) -> Result<Bytes, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn detects_png_and_jpeg() {
        let png = ImageData::new(PNG_MAGIC.to_vec());
        assert_eq!(png.mime_type, "image/png");
        assert_eq!(png.extension(), ".png");

        let jpeg = ImageData::new(JPEG_MAGIC.to_vec());
        assert_eq!(jpeg.mime_type, "image/jpeg");
        assert_eq!(jpeg.extension(), ".jpg");
    }

    #[test]
    fn unknown_bytes_fall_back_to_png() {
        let data = ImageData::new(b"not an image".to_vec());
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(data.extension(), ".png");
    }
}
