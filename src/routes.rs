use axum::{Json, Router, extract::{Path, State}, http::header, response::IntoResponse, routing::{get, post}};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{CurriculumSummary, GenerateRequest, StoredStory, StoryResponse};
use crate::pipeline::StoryPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: StoryPipeline,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate_story))
        .route("/curriculums", get(list_curriculums))
        .route("/stories/:id", get(get_story))
        .route("/media/:key", get(get_media))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate_story(State(state): State<AppState>, Json(body): Json<GenerateRequest>) -> AppResult<Json<StoryResponse>> {
    if let Some(reason) = body.invalid_reason() {
        return Err(AppError::BadRequest(reason));
    }
    let story = state.pipeline.run(&body).await?;
    tracing::info!(story_id = %story.story_id, "🎉 Story generated, responding");
    Ok(Json(story))
}

pub async fn list_curriculums(State(state): State<AppState>) -> AppResult<Json<Vec<CurriculumSummary>>> {
    Ok(Json(state.pipeline.store().list_curriculums().await?))
}

pub async fn get_story(Path(id): Path<String>, State(state): State<AppState>) -> AppResult<Json<StoredStory>> {
    // ids that are not UUIDs cannot exist, so they share the 404 path
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return Err(AppError::StoryNotFound(id));
    };
    match state.pipeline.store().story(uuid).await {
        Ok(story) => Ok(Json(story)),
        Err(StoreError::NotFound { .. }) => Err(AppError::StoryNotFound(id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_media(Path(key): Path<String>, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let object = state.pipeline.storage().fetch(&key).await?;
    Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes))
}
