use std::{path::PathBuf, time::Duration};

use crate::error::ConfigError;
use crate::openai::OpenAiImageModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextProvider {
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProviderKind {
    OpenAi(OpenAiImageModel),
    Gemini,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
    pub bucket: String,
}

/// Server configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub public_base_url: String,
    pub database_url: Option<String>,
    /// JSON array of curricula that seeds the in-memory store when no database is set.
    pub curriculum_file: Option<PathBuf>,
    pub supabase: Option<SupabaseConfig>,
    pub text_provider: TextProvider,
    pub image_provider: ImageProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_text_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let port = parse_var("PORT", var("PORT"), 8000u16)?;
        let cors_origins = or("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let public_base_url = var("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_API")) {
            (Some(url), Some(api_key)) => Some(SupabaseConfig {
                url,
                api_key,
                bucket: or("SUPABASE_BUCKET", "edu-tale-assets"),
            }),
            (Some(_), None) => return Err(ConfigError::MissingKey { var: "SUPABASE_API", provider: "supabase storage" }),
            _ => None,
        };

        let text_provider = match or("TEXT_PROVIDER", "openai").to_ascii_lowercase().as_str() {
            "openai" => TextProvider::OpenAi,
            "gemini" => TextProvider::Gemini,
            other => return Err(ConfigError::Invalid { var: "TEXT_PROVIDER", value: other.to_string() }),
        };
        let image_provider = match or("IMAGE_PROVIDER", "gpt-image").to_ascii_lowercase().as_str() {
            "gpt-image" => ImageProviderKind::OpenAi(OpenAiImageModel::GptImage),
            "dall-e" => ImageProviderKind::OpenAi(OpenAiImageModel::DallE3),
            "gemini" => ImageProviderKind::Gemini,
            other => return Err(ConfigError::Invalid { var: "IMAGE_PROVIDER", value: other.to_string() }),
        };

        let config = Self {
            port,
            cors_origins,
            public_base_url,
            database_url: var("DATABASE_URL"),
            curriculum_file: var("CURRICULUM_FILE").map(PathBuf::from),
            supabase,
            text_provider,
            image_provider,
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: or("OPENAI_API_BASE", "https://api.openai.com/v1"),
            openai_text_model: or("OPENAI_TEXT_MODEL", "gpt-4o-2024-08-06"),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_base_url: or("GEMINI_API_BASE", "https://generativelanguage.googleapis.com/v1beta"),
            gemini_text_model: or("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            gemini_image_model: or("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image-preview"),
            tts_model: or("TTS_MODEL", "tts-1"),
            tts_voice: or("TTS_VOICE", "nova"),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", var("HTTP_TIMEOUT_SECS"), 180u64)?),
        };
        config.check_keys()?;
        Ok(config)
    }

    fn check_keys(&self) -> Result<(), ConfigError> {
        if self.database_url.is_none() && self.curriculum_file.is_none() {
            return Err(ConfigError::NoCurriculumSource);
        }
        // narration always goes through OpenAI
        if self.openai_api_key.is_none() {
            return Err(ConfigError::MissingKey { var: "OPENAI_API_KEY", provider: "openai speech" });
        }
        let needs_gemini = self.text_provider == TextProvider::Gemini || self.image_provider == ImageProviderKind::Gemini;
        if needs_gemini && self.gemini_api_key.is_none() {
            return Err(ConfigError::MissingKey { var: "GEMINI_API_KEY", provider: "gemini" });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var: name, value: v }),
    }
}
