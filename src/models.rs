use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Number of scenes every storybook is drafted with.
pub const SCENE_COUNT: usize = 5;

/// Scenes that must carry a quiz. Every other scene must not.
pub const QUIZ_SCENES: [u32; 2] = [3, 5];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub child_name: String,
    pub age: i32,
    pub personality: String,
    pub emotion: String,
    pub stage_code: String,
}

impl GenerateRequest {
    /// Returns the first problem found with the request, if any.
    pub fn invalid_reason(&self) -> Option<String> {
        let required = [
            ("child_name", &self.child_name),
            ("personality", &self.personality),
            ("emotion", &self.emotion),
            ("stage_code", &self.stage_code),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Some(format!("{field} must not be empty"));
        }
        if self.age <= 0 {
            return Some(format!("age must be positive, got {}", self.age));
        }
        None
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    ShortAnswer,
    Choice,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Quiz {
    #[serde(rename = "type")]
    pub kind: QuizKind,
    pub question: String,
    pub answer: String,
    pub correct_msg: String,
    pub wrong_msg: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Scene {
    pub scene_no: u32,
    pub text: String,
    pub image_prompt: String,
    // filled in after upload
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub audio_url: String,
    #[serde(default)]
    pub quiz: Option<Quiz>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoryDraft {
    pub title: String,
    pub summary: String,
    pub style_guide: String,
    pub character_bible: String,
    pub anchor_prompt: String,
    pub scenes: Vec<Scene>,
}

impl StoryDraft {
    /// Scenes whose quiz presence breaks the "quiz on 3 and 5 only" rule.
    pub fn quiz_violations(&self) -> Vec<u32> {
        self.scenes
            .iter()
            .filter(|s| QUIZ_SCENES.contains(&s.scene_no) != s.quiz.is_some())
            .map(|s| s.scene_no)
            .collect()
    }

    /// True when the scenes are numbered exactly 1..=SCENE_COUNT in order.
    pub fn has_canonical_numbering(&self) -> bool {
        self.scenes.len() == SCENE_COUNT
            && self.scenes.iter().zip(1..).all(|(s, n)| s.scene_no == n)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
}

/// One generated asset, alive only for the duration of a pipeline run.
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    pub scene_no: u32,
    pub kind: MediaKind,
    pub data: Option<bytes::Bytes>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Curriculum {
    pub stage_code: String,
    pub title: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source_text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurriculumSummary {
    pub stage_code: String,
    pub title: String,
    pub chapter: Option<String>,
    pub description: Option<String>,
}

impl From<&Curriculum> for CurriculumSummary {
    fn from(c: &Curriculum) -> Self {
        Self {
            stage_code: c.stage_code.clone(),
            title: c.title.clone(),
            chapter: c.chapter.clone(),
            description: c.description.clone(),
        }
    }
}

/// Everything needed to write a finished story.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub user_id: Option<String>,
    pub stage_code: String,
    pub emotion: String,
    pub title: String,
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredStory {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub stage_code: String,
    pub emotion: String,
    pub title: String,
    pub scenes: Vec<Scene>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoryResponse {
    pub story_id: Uuid,
    pub title: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub scenes: Vec<Scene>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn scene(n: u32) -> Scene {
        Scene {
            scene_no: n,
            text: format!("장면 {n}"),
            image_prompt: format!("scene {n} in a meadow"),
            image_url: String::new(),
            audio_url: String::new(),
            quiz: QUIZ_SCENES.contains(&n).then(|| Quiz {
                kind: QuizKind::ShortAnswer,
                question: "하나 더하기 하나는?".into(),
                answer: "2".into(),
                correct_msg: "잘했어!".into(),
                wrong_msg: "다시 해보자!".into(),
            }),
        }
    }

    pub fn draft() -> StoryDraft {
        StoryDraft {
            title: "미나의 숫자 모험".into(),
            summary: "미나가 숫자를 세며 용기를 얻는 이야기".into(),
            style_guide: "Soft watercolor, pastel palette".into(),
            character_bible: "Girl with short black hair, yellow raincoat".into(),
            anchor_prompt: "Mina standing, full body".into(),
            scenes: (1..=SCENE_COUNT as u32).map(scene).collect(),
        }
    }

    pub fn request() -> GenerateRequest {
        GenerateRequest {
            user_id: None,
            child_name: "Mina".into(),
            age: 6,
            personality: "curious".into(),
            emotion: "anxious".into(),
            stage_code: "K-MATH-01".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_draft_has_no_quiz_violations() {
        let draft = fixtures::draft();
        assert!(draft.has_canonical_numbering());
        assert!(draft.quiz_violations().is_empty());
    }

    #[test]
    fn quiz_on_wrong_scene_is_reported() {
        let mut draft = fixtures::draft();
        draft.scenes[1].quiz = draft.scenes[2].quiz.clone();
        draft.scenes[4].quiz = None;
        assert_eq!(draft.quiz_violations(), vec![2, 5]);
    }

    #[test]
    fn quiz_type_uses_wire_names() {
        let json = r#"{"type":"choice","question":"q","answer":"a","correct_msg":"c","wrong_msg":"w"}"#;
        let quiz: Quiz = serde_json::from_str(json).unwrap();
        assert_eq!(quiz.kind, QuizKind::Choice);
        let back = serde_json::to_value(&quiz).unwrap();
        assert_eq!(back["type"], "choice");
    }

    #[test]
    fn scene_urls_default_to_empty() {
        let json = r#"{"scene_no":1,"text":"t","image_prompt":"p","quiz":null}"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.image_url, "");
        assert_eq!(scene.audio_url, "");
        assert!(scene.quiz.is_none());
    }

    #[test]
    fn request_validation() {
        assert_eq!(fixtures::request().invalid_reason(), None);

        let mut blank = fixtures::request();
        blank.emotion = "  ".into();
        assert_eq!(blank.invalid_reason().as_deref(), Some("emotion must not be empty"));

        let mut young = fixtures::request();
        young.age = 0;
        assert!(young.invalid_reason().unwrap().starts_with("age must be positive"));
    }
}
