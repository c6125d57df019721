use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{fmt, EnvFilter};

use storybook_generator::config::{Config, ImageProviderKind, TextProvider};
use storybook_generator::gemini::GeminiClient;
use storybook_generator::openai::{OpenAiClient, OpenAiImages, OpenAiNarrator, OpenAiWriter};
use storybook_generator::pipeline::StoryPipeline;
use storybook_generator::providers::{ImageProvider, StoryWriter};
use storybook_generator::routes::{router, AppState};
use storybook_generator::storage::{MediaStorage, MemoryStorage, SupabaseStorage};
use storybook_generator::store::{self, MemoryStore, PgStore, StoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("loading configuration")?;
    let pipeline = build_pipeline(&config).await?;

    let cors_origins = config
        .cors_origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("parsing CORS_ORIGINS")?;
    let app = router(AppState { pipeline })
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true)
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn build_pipeline(config: &Config) -> anyhow::Result<StoryPipeline> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("building HTTP client")?;

    let openai_key = config.openai_api_key.clone().unwrap_or_default();
    tracing::info!("Using OpenAI key: {}...", key_preview(&openai_key));
    let openai = OpenAiClient::new(http.clone(), openai_key, config.openai_base_url.clone());
    let gemini = config.gemini_api_key.clone().map(|key| {
        Arc::new(GeminiClient::new(
            http.clone(),
            key,
            config.gemini_base_url.clone(),
            config.gemini_text_model.clone(),
            config.gemini_image_model.clone(),
        ))
    });

    let writer: Arc<dyn StoryWriter> = match (config.text_provider, &gemini) {
        (TextProvider::Gemini, Some(g)) => g.clone(),
        (TextProvider::Gemini, None) => anyhow::bail!("GEMINI_API_KEY is required for TEXT_PROVIDER=gemini"),
        (TextProvider::OpenAi, _) => Arc::new(OpenAiWriter::new(openai.clone(), config.openai_text_model.clone())),
    };
    let images: Arc<dyn ImageProvider> = match (config.image_provider, &gemini) {
        (ImageProviderKind::Gemini, Some(g)) => g.clone(),
        (ImageProviderKind::Gemini, None) => anyhow::bail!("GEMINI_API_KEY is required for IMAGE_PROVIDER=gemini"),
        (ImageProviderKind::OpenAi(model), _) => Arc::new(OpenAiImages::new(openai.clone(), model)),
    };
    let narrator = Arc::new(OpenAiNarrator::new(openai, config.tts_model.clone(), config.tts_voice.clone()));
    tracing::info!(text = ?config.text_provider, image = ?config.image_provider, "Providers selected");

    let storage: Arc<dyn MediaStorage> = match &config.supabase {
        Some(s) => Arc::new(SupabaseStorage::new(http.clone(), s.url.clone(), s.api_key.clone(), s.bucket.clone())),
        None => {
            tracing::warn!("SUPABASE_URL not set, keeping media in memory");
            Arc::new(MemoryStorage::new(config.public_base_url.clone()))
        }
    };
    let story_store: Arc<dyn StoryStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(store::connect(url).await.context("connecting to database")?)),
        None => {
            // config guarantees a curriculum file when there is no database
            let path = config.curriculum_file.as_deref().context("CURRICULUM_FILE is not set")?;
            tracing::warn!(path = %path.display(), "DATABASE_URL not set, using an in-memory store");
            Arc::new(MemoryStore::from_curriculum_file(path).context("seeding in-memory store")?)
        }
    };

    Ok(StoryPipeline::new(writer, images, narrator, storage, story_store))
}

/// First seven characters of a secret, for start-up logs.
fn key_preview(key: &str) -> String {
    key.chars().take(7).collect()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutting down");
}
