//! Curriculum and story persistence.

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Curriculum, CurriculumSummary, NewStory, Scene, StoredStory};

#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn curriculum(&self, stage_code: &str) -> Result<Curriculum, StoreError>;

    /// All curricula ordered by stage code.
    async fn list_curriculums(&self) -> Result<Vec<CurriculumSummary>, StoreError>;

    /// Write a finished story and return its assigned id.
    async fn insert_story(&self, story: NewStory) -> Result<Uuid, StoreError>;

    async fn story(&self, id: Uuid) -> Result<StoredStory, StoreError>;
}

/// Create a connection pool and apply pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;
    Ok(pool)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StoryRow {
    id: Uuid,
    user_id: Option<String>,
    stage_code: String,
    emotion: String,
    title: String,
    scenes: Json<Vec<Scene>>,
    created_at: DateTime<Utc>,
}

impl From<StoryRow> for StoredStory {
    fn from(row: StoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            stage_code: row.stage_code,
            emotion: row.emotion,
            title: row.title,
            scenes: row.scenes.0,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl StoryStore for PgStore {
    async fn curriculum(&self, stage_code: &str) -> Result<Curriculum, StoreError> {
        sqlx::query_as::<_, (String, String, Option<String>, Option<String>, String)>(
            "SELECT stage_code, title, chapter, description, source_text FROM curriculums WHERE stage_code = $1",
        )
        .bind(stage_code)
        .fetch_optional(&self.pool)
        .await?
        .map(|(stage_code, title, chapter, description, source_text)| Curriculum {
            stage_code,
            title,
            chapter,
            description,
            source_text,
        })
        .ok_or_else(|| StoreError::NotFound { entity: "curriculum", key: stage_code.to_string() })
    }

    async fn list_curriculums(&self) -> Result<Vec<CurriculumSummary>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT stage_code, title, chapter, description FROM curriculums ORDER BY stage_code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(stage_code, title, chapter, description)| CurriculumSummary { stage_code, title, chapter, description })
            .collect())
    }

    async fn insert_story(&self, story: NewStory) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO stories (user_id, stage_code, emotion, title, scenes) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&story.user_id)
        .bind(&story.stage_code)
        .bind(&story.emotion)
        .bind(&story.title)
        .bind(Json(&story.scenes))
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(story_id = %id, title = %story.title, "💾 Story saved");
        Ok(id)
    }

    async fn story(&self, id: Uuid) -> Result<StoredStory, StoreError> {
        sqlx::query_as::<_, StoryRow>(
            "SELECT id, user_id, stage_code, emotion, title, scenes, created_at FROM stories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(StoredStory::from)
        .ok_or_else(|| StoreError::NotFound { entity: "story", key: id.to_string() })
    }
}

/// In-process store used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    curriculums: RwLock<HashMap<String, Curriculum>>,
    stories: RwLock<HashMap<Uuid, StoredStory>>,
}

impl MemoryStore {
    pub fn with_curriculums(curriculums: impl IntoIterator<Item = Curriculum>) -> Self {
        let store = Self::default();
        store.curriculums.write().extend(curriculums.into_iter().map(|c| (c.stage_code.clone(), c)));
        store
    }

    /// Seed from a JSON array of curricula on disk.
    pub fn from_curriculum_file(path: &Path) -> Result<Self, StoreError> {
        let seed_error = |reason: String| StoreError::Seed { path: path.display().to_string(), reason };
        let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        let curriculums = parse_curriculums(&raw).map_err(seed_error)?;
        tracing::info!(count = curriculums.len(), path = %path.display(), "📚 Loaded curricula");
        Ok(Self::with_curriculums(curriculums))
    }

    pub fn story_count(&self) -> usize {
        self.stories.read().len()
    }
}

fn parse_curriculums(raw: &str) -> Result<Vec<Curriculum>, String> {
    let curriculums: Vec<Curriculum> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    if let Some(c) = curriculums.iter().find(|c| c.stage_code.trim().is_empty()) {
        return Err(format!("curriculum '{}' has an empty stage_code", c.title));
    }
    Ok(curriculums)
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn curriculum(&self, stage_code: &str) -> Result<Curriculum, StoreError> {
        self.curriculums
            .read()
            .get(stage_code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { entity: "curriculum", key: stage_code.to_string() })
    }

    async fn list_curriculums(&self) -> Result<Vec<CurriculumSummary>, StoreError> {
        let mut list: Vec<CurriculumSummary> = self.curriculums.read().values().map(CurriculumSummary::from).collect();
        list.sort_by(|a, b| a.stage_code.cmp(&b.stage_code));
        Ok(list)
    }

    async fn insert_story(&self, story: NewStory) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let stored = StoredStory {
            id,
            user_id: story.user_id,
            stage_code: story.stage_code,
            emotion: story.emotion,
            title: story.title,
            scenes: story.scenes,
            created_at: Utc::now(),
        };
        self.stories.write().insert(id, stored);
        Ok(id)
    }

    async fn story(&self, id: Uuid) -> Result<StoredStory, StoreError> {
        self.stories
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { entity: "story", key: id.to_string() })
    }
}
