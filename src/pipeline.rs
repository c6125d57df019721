//! The storybook generation workflow.
//!
//! Curriculum lookup → drafting → {anchor → scenes (in order)} ∥ {narration}
//! → upload → persist. Drafting and persistence failures abort the run;
//! individual media and upload failures leave an empty URL behind.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::{StoreError, StoryError};
use crate::models::{GenerateRequest, MediaArtifact, MediaKind, NewStory, Scene, StoryDraft, StoryResponse, SCENE_COUNT};
use crate::prompts::{build_anchor_prompt, build_scene_prompt};
use crate::providers::{DraftBrief, ImageData, ImageProvider, Narrator, ReferenceSupport, StoryWriter};
use crate::storage::{upload_media, MediaStorage};
use crate::store::StoryStore;

#[derive(Clone)]
pub struct StoryPipeline {
    writer: Arc<dyn StoryWriter>,
    images: Arc<dyn ImageProvider>,
    narrator: Arc<dyn Narrator>,
    storage: Arc<dyn MediaStorage>,
    store: Arc<dyn StoryStore>,
}

impl StoryPipeline {
    pub fn new(
        writer: Arc<dyn StoryWriter>,
        images: Arc<dyn ImageProvider>,
        narrator: Arc<dyn Narrator>,
        storage: Arc<dyn MediaStorage>,
        store: Arc<dyn StoryStore>,
    ) -> Self {
        Self { writer, images, narrator, storage, store }
    }

    pub fn store(&self) -> &Arc<dyn StoryStore> {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn MediaStorage> {
        &self.storage
    }

    /// Run the whole workflow for one request.
    pub async fn run(&self, req: &GenerateRequest) -> Result<StoryResponse, StoryError> {
        info!(child = %req.child_name, emotion = %req.emotion, stage_code = %req.stage_code, "📥 Story requested");

        let (curriculum_title, source_text) = self.lookup_curriculum(&req.stage_code).await?;
        info!(%curriculum_title, "✅ [Step 1] Curriculum found");

        let mut draft = self.draft(req, &source_text).await?;
        info!(title = %draft.title, "✅ [Step 2] Draft ready");

        let artifacts = self.generate_media(&draft).await;
        let produced = artifacts.iter().filter(|a| a.data.is_some()).count();
        info!(produced, total = artifacts.len(), "✅ [Step 3] Media generated");

        self.upload_all(&mut draft.scenes, artifacts).await;
        info!("✅ [Step 4] Uploads finished");

        let story_id = self
            .store
            .insert_story(NewStory {
                user_id: req.user_id.clone(),
                stage_code: req.stage_code.clone(),
                emotion: req.emotion.clone(),
                title: draft.title.clone(),
                scenes: draft.scenes.clone(),
            })
            .await
            .map_err(StoryError::Persistence)?;
        info!(%story_id, "🎉 [Step 5] Story saved");

        Ok(StoryResponse {
            story_id,
            title: draft.title,
            summary: draft.summary,
            created_at: chrono::Utc::now(),
            scenes: draft.scenes,
        })
    }

    /// Returns `(title, source_text)` for a stage code.
    pub async fn lookup_curriculum(&self, stage_code: &str) -> Result<(String, String), StoryError> {
        match self.store.curriculum(stage_code).await {
            Ok(c) => Ok((c.title, c.source_text)),
            Err(StoreError::NotFound { .. }) => Err(StoryError::CurriculumNotFound(stage_code.to_string())),
            Err(e) => Err(StoryError::Lookup(e)),
        }
    }

    pub async fn draft(&self, req: &GenerateRequest, source_text: &str) -> Result<StoryDraft, StoryError> {
        let brief = DraftBrief {
            child_name: &req.child_name,
            age: req.age,
            personality: &req.personality,
            emotion: &req.emotion,
            source_text,
        };
        let mut draft = self.writer.draft_story(&brief).await.map_err(StoryError::Generation)?;
        normalize_scenes(&mut draft)?;

        let violations = draft.quiz_violations();
        if !violations.is_empty() {
            warn!(scenes = ?violations, "⚠️ Draft places quizzes outside scenes 3 and 5");
        }
        Ok(draft)
    }

    /// Image chain and narration run side by side.
    pub async fn generate_media(&self, draft: &StoryDraft) -> Vec<MediaArtifact> {
        info!("🚀 Illustrating in order, narrating concurrently");
        let (mut images, audio) = tokio::join!(self.illustrate(draft), self.narrate_all(draft));
        images.extend(audio);
        images
    }

    async fn illustrate(&self, draft: &StoryDraft) -> Vec<MediaArtifact> {
        let anchor = self.generate_anchor(draft).await;
        self.generate_scene_images(draft, anchor.as_ref()).await
    }

    /// Character reference sheet; `None` when generation fails.
    pub async fn generate_anchor(&self, draft: &StoryDraft) -> Option<ImageData> {
        info!("🎨 [Anchor] Generating character reference sheet");
        let prompt = build_anchor_prompt(&draft.anchor_prompt, &draft.style_guide, &draft.character_bible);
        match self.images.generate(&prompt, &[]).await {
            Ok(image) => {
                info!(size = image.bytes.len(), "✅ [Anchor] Reference sheet ready");
                Some(image)
            }
            Err(e) => {
                error!(error = %e, "❌ [Anchor] Generation failed, continuing without it");
                None
            }
        }
    }

    /// Scene N+1 starts only after scene N resolved. The continuity reference
    /// is the last successful scene image.
    pub async fn generate_scene_images(&self, draft: &StoryDraft, anchor: Option<&ImageData>) -> Vec<MediaArtifact> {
        let support = self.images.reference_support();
        let mut previous: Option<ImageData> = None;
        let mut artifacts = Vec::with_capacity(draft.scenes.len());

        for scene in &draft.scenes {
            let references: Vec<ImageData> = match support {
                ReferenceSupport::MultiImage => anchor.into_iter().chain(previous.as_ref()).cloned().collect(),
                ReferenceSupport::TextOnly => Vec::new(),
            };
            let prompt = build_scene_prompt(&scene.image_prompt, &draft.style_guide, &draft.character_bible);

            info!(scene_no = scene.scene_no, references = references.len(), "🎨 Drawing scene");
            let data = match self.images.generate(&prompt, &references).await {
                Ok(image) => {
                    info!(scene_no = scene.scene_no, "✅ Scene illustrated");
                    let bytes = image.bytes.clone();
                    previous = Some(image);
                    Some(bytes)
                }
                Err(e) => {
                    error!(scene_no = scene.scene_no, error = %e, "❌ Scene illustration failed");
                    None
                }
            };
            artifacts.push(MediaArtifact { scene_no: scene.scene_no, kind: MediaKind::Image, data });
        }
        artifacts
    }

    /// One speech call per scene, all in flight together.
    pub async fn narrate_all(&self, draft: &StoryDraft) -> Vec<MediaArtifact> {
        let calls = draft.scenes.iter().map(|scene| async move {
            info!(scene_no = scene.scene_no, "🎵 Recording narration");
            let data = match self.narrator.narrate(&scene.text).await {
                Ok(audio) => {
                    info!(scene_no = scene.scene_no, size = audio.len(), "✅ Narration recorded");
                    Some(audio)
                }
                Err(e) => {
                    error!(scene_no = scene.scene_no, error = %e, "❌ Narration failed");
                    None
                }
            };
            MediaArtifact { scene_no: scene.scene_no, kind: MediaKind::Audio, data }
        });
        join_all(calls).await
    }

    /// Uploads each produced asset and writes its URL into the matching scene.
    pub async fn upload_all(&self, scenes: &mut [Scene], artifacts: Vec<MediaArtifact>) {
        info!("📦 Uploading generated media");
        for artifact in artifacts {
            let Some(bytes) = artifact.data else { continue };
            let (ext, content_type) = asset_format(artifact.kind, &bytes);

            let url = match upload_media(self.storage.as_ref(), bytes, ext, &content_type).await {
                Ok(url) => url,
                Err(e) => {
                    error!(scene_no = artifact.scene_no, kind = ?artifact.kind, error = %e, "❌ Upload failed");
                    continue;
                }
            };
            let Some(scene) = scenes.iter_mut().find(|s| s.scene_no == artifact.scene_no) else {
                warn!(scene_no = artifact.scene_no, "⚠️ Uploaded asset has no matching scene");
                continue;
            };
            match artifact.kind {
                MediaKind::Image => scene.image_url = url,
                MediaKind::Audio => scene.audio_url = url,
            }
            info!(scene_no = artifact.scene_no, kind = ?artifact.kind, "✅ Uploaded");
        }
    }
}

fn asset_format(kind: MediaKind, bytes: &Bytes) -> (&'static str, String) {
    match kind {
        MediaKind::Image => {
            let image = ImageData::new(bytes.clone());
            (image.extension(), image.mime_type)
        }
        MediaKind::Audio => (".mp3", "audio/mpeg".to_string()),
    }
}

/// Orders scenes and checks there are exactly `SCENE_COUNT` of them,
/// renumbering 1..=N if the model numbered them some other way.
fn normalize_scenes(draft: &mut StoryDraft) -> Result<(), StoryError> {
    if draft.scenes.len() != SCENE_COUNT {
        return Err(StoryError::InvalidDraft(format!(
            "expected {SCENE_COUNT} scenes, got {}",
            draft.scenes.len()
        )));
    }
    draft.scenes.sort_by_key(|s| s.scene_no);
    if !draft.has_canonical_numbering() {
        warn!("⚠️ Draft scene numbers are not 1..={SCENE_COUNT}, renumbering");
        for (scene, n) in draft.scenes.iter_mut().zip(1..) {
            scene.scene_no = n;
        }
    }
    Ok(())
}
