//! Drives the HTTP surface end to end with in-process providers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::{Request, StatusCode}, Router};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use storybook_generator::error::ProviderError;
use storybook_generator::models::{Curriculum, Quiz, QuizKind, Scene, StoryDraft};
use storybook_generator::pipeline::StoryPipeline;
use storybook_generator::providers::{DraftBrief, ImageData, ImageProvider, Narrator, ReferenceSupport, StoryWriter};
use storybook_generator::routes::{router, AppState};
use storybook_generator::storage::MemoryStorage;
use storybook_generator::store::MemoryStore;

struct ScriptedWriter;

#[async_trait]
impl StoryWriter for ScriptedWriter {
    async fn draft_story(&self, brief: &DraftBrief<'_>) -> Result<StoryDraft, ProviderError> {
        let scenes = (1..=5)
            .map(|n| Scene {
                scene_no: n,
                text: format!("{}의 이야기 {n}", brief.child_name),
                image_prompt: format!("{} scene {n}", brief.child_name),
                image_url: String::new(),
                audio_url: String::new(),
                quiz: (n == 3 || n == 5).then(|| Quiz {
                    kind: QuizKind::Choice,
                    question: "사과는 몇 개일까?".into(),
                    answer: "3".into(),
                    correct_msg: "맞았어!".into(),
                    wrong_msg: "다시 세어볼까?".into(),
                }),
            })
            .collect();
        Ok(StoryDraft {
            title: format!("{}와 숫자 나라", brief.child_name),
            summary: brief.source_text.to_string(),
            style_guide: "watercolor".into(),
            character_bible: "girl in a yellow raincoat".into(),
            anchor_prompt: "standing, smiling".into(),
            scenes,
        })
    }
}

struct SolidImages;

#[async_trait]
impl ImageProvider for SolidImages {
    fn reference_support(&self) -> ReferenceSupport {
        ReferenceSupport::MultiImage
    }

    async fn generate(&self, _prompt: &str, _references: &[ImageData]) -> Result<ImageData, ProviderError> {
        Ok(ImageData::new(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]))
    }
}

struct EchoNarrator;

#[async_trait]
impl Narrator for EchoNarrator {
    async fn narrate(&self, text: &str) -> Result<Bytes, ProviderError> {
        Ok(Bytes::from(text.as_bytes().to_vec()))
    }
}

fn app() -> Router {
    let store = MemoryStore::with_curriculums([
        Curriculum {
            stage_code: "K-MATH-01".into(),
            title: "숫자 세기".into(),
            chapter: Some("1단원".into()),
            description: Some("1부터 10까지".into()),
            source_text: "counting to 10".into(),
        },
        Curriculum {
            stage_code: "K-KOR-01".into(),
            title: "낱말 놀이".into(),
            chapter: None,
            description: None,
            source_text: "simple words".into(),
        },
    ]);
    let pipeline = StoryPipeline::new(
        Arc::new(ScriptedWriter),
        Arc::new(SolidImages),
        Arc::new(EchoNarrator),
        Arc::new(MemoryStorage::new("http://localhost:8000")),
        Arc::new(store),
    );
    router(AppState { pipeline })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn mina() -> Value {
    json!({
        "child_name": "Mina",
        "age": 6,
        "personality": "curious",
        "emotion": "anxious",
        "stage_code": "K-MATH-01"
    })
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = get_json(&app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn curriculums_are_listed_by_stage_code() {
    let (status, body) = get_json(&app(), "/curriculums").await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body.as_array().unwrap().iter().map(|c| c["stage_code"].as_str().unwrap()).collect();
    assert_eq!(codes, vec!["K-KOR-01", "K-MATH-01"]);
    assert!(body[0].get("source_text").is_none());
}

#[tokio::test]
async fn generated_story_can_be_fetched_back() {
    let app = app();
    let (status, story) = post_json(&app, "/generate", mina()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(story["title"], "Mina와 숫자 나라");
    assert_eq!(story["summary"], "counting to 10");

    let scenes = story["scenes"].as_array().unwrap();
    assert_eq!(scenes.len(), 5);
    for (i, scene) in scenes.iter().enumerate() {
        assert_eq!(scene["scene_no"], i + 1);
        assert_eq!(scene["quiz"].is_null(), !(i == 2 || i == 4));
        assert!(scene["image_url"].as_str().unwrap().ends_with(".png"));
        assert!(scene["audio_url"].as_str().unwrap().ends_with(".mp3"));
    }

    let id = story["story_id"].as_str().unwrap();
    let (status, stored) = get_json(&app, &format!("/stories/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["title"], story["title"]);
    assert_eq!(stored["scenes"], story["scenes"]);
    assert_eq!(stored["stage_code"], "K-MATH-01");
}

#[tokio::test]
async fn uploaded_media_is_served_by_key() {
    let app = app();
    let (_, story) = post_json(&app, "/generate", mina()).await;
    let audio_url = story["scenes"][0]["audio_url"].as_str().unwrap();
    let path = audio_url.strip_prefix("http://localhost:8000").unwrap();

    let response = app.clone().oneshot(Request::get(path).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), "Mina의 이야기 1");
}

#[tokio::test]
async fn unknown_stage_code_is_404() {
    let mut request = mina();
    request["stage_code"] = json!("K-MATH-99");
    let (status, body) = post_json(&app(), "/generate", request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn empty_child_name_is_400() {
    let mut request = mina();
    request["child_name"] = json!("");
    let (status, body) = post_json(&app(), "/generate", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "child_name must not be empty");
}

#[tokio::test]
async fn unknown_story_and_media_are_404() {
    let app = app();
    let (status, _) = get_json(&app, "/stories/7d9f1c1e-4f3b-4b8e-9a51-0c6f2d1e8a42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_json(&app, "/media/missing.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_story_id_is_json_404() {
    let (status, body) = get_json(&app(), "/stories/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], "story not found: 42");
}
