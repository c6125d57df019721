use serde_json::{json, Value};

use crate::models::SCENE_COUNT;
use crate::providers::DraftBrief;

/// User turn sent alongside the drafting instruction.
pub const DRAFT_REQUEST: &str = "규격에 맞춰서 동화책 JSON 데이터를 생성해줘.";

pub fn build_draft_instruction(brief: &DraftBrief<'_>) -> String {
    let DraftBrief { child_name, age, personality, emotion, source_text } = brief;
    format!(
        "당신은 {age}살 아이들의 마음을 읽어주는 최고의 맞춤형 동화 작가이자 교육 전문가입니다.\n\
         아이의 이름은 '{child_name}'이고, 성향은 '{personality}'이며, 현재 기분은 '{emotion}' 상태입니다.\n\
         이 아이를 달래주기 위해, 아래의 [학습 개념]을 자연스럽게 녹여낸 {SCENE_COUNT}장짜리 동화책 대본을 작성하세요.\n\
         \n\
         [학습 개념]\n\
         {source_text}\n\
         \n\
         [작성 규칙]\n\
         1. 주인공의 이름은 반드시 '{child_name}'으로 하세요.\n\
         2. 총 {SCENE_COUNT}개의 씬(scene)으로 구성하고 scene_no는 1부터 순서대로 매기세요.\n\
         3. 3번 씬과 5번 씬에는 반드시 [학습 개념]과 관련된 퀴즈(quiz)를 넣으세요. 나머지 씬의 quiz는 null로 비워두세요.\n\
         4. 각 씬마다 그림을 그릴 수 있도록 'image_prompt'를 상세한 영어로 작성하세요. (수채화 풍의 따뜻한 동화책 스타일을 묘사할 것)\n\
         5. 모든 동화 내용, 대사, 퀴즈는 반드시 '한국어'로 작성하세요. (단, image_prompt와 style_guide 등은 반드시 영어로 작성할 것)\n\
         6. 일관된 그림 생성을 위해 'style_guide', 'character_bible', 'anchor_prompt'를 구체적인 영어로 작성하세요."
    )
}

pub fn build_anchor_prompt(anchor_prompt: &str, style_guide: &str, character_bible: &str) -> String {
    format!(
        "{style_guide}\n{character_bible}\n{anchor_prompt}\n\
         Important: Create a character reference sheet showing the full body and face clearly."
    )
}

pub fn build_scene_prompt(scene_prompt: &str, style_guide: &str, character_bible: &str) -> String {
    format!(
        "{style_guide}\n{character_bible}\n\
         Continuity rules: Keep the protagonist's face, hair, and outfit colors exactly the same as the reference image. \
         Match the watercolor texture and linework style.\n\
         \n\
         Scene Description:\n{scene_prompt}"
    )
}

fn quiz_properties(string: &Value) -> Value {
    json!({
        "type": { "type": "string", "enum": ["short_answer", "choice"] },
        "question": string,
        "answer": string,
        "correct_msg": string,
        "wrong_msg": string,
    })
}

const QUIZ_FIELDS: [&str; 5] = ["type", "question", "answer", "correct_msg", "wrong_msg"];
const SCENE_FIELDS: [&str; 4] = ["scene_no", "text", "image_prompt", "quiz"];
const DRAFT_FIELDS: [&str; 6] = ["title", "summary", "style_guide", "character_bible", "anchor_prompt", "scenes"];

/// Strict JSON schema for OpenAI structured outputs.
pub fn story_draft_json_schema() -> Value {
    let string = json!({ "type": "string" });
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": DRAFT_FIELDS,
        "properties": {
            "title": string,
            "summary": string,
            "style_guide": string,
            "character_bible": string,
            "anchor_prompt": string,
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": SCENE_FIELDS,
                    "properties": {
                        "scene_no": { "type": "integer" },
                        "text": string,
                        "image_prompt": string,
                        "quiz": {
                            "anyOf": [
                                {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": QUIZ_FIELDS,
                                    "properties": quiz_properties(&string),
                                },
                                { "type": "null" }
                            ]
                        }
                    }
                }
            }
        }
    })
}

/// The same shape in Gemini's OpenAPI-subset schema dialect.
pub fn story_draft_gemini_schema() -> Value {
    let string = json!({ "type": "STRING" });
    let mut quiz_props = quiz_properties(&string);
    quiz_props["type"] = json!({ "type": "STRING", "enum": ["short_answer", "choice"] });
    json!({
        "type": "OBJECT",
        "required": DRAFT_FIELDS,
        "properties": {
            "title": string,
            "summary": string,
            "style_guide": string,
            "character_bible": string,
            "anchor_prompt": string,
            "scenes": {
                "type": "ARRAY",
                "minItems": SCENE_COUNT,
                "maxItems": SCENE_COUNT,
                "items": {
                    "type": "OBJECT",
                    "required": ["scene_no", "text", "image_prompt"],
                    "properties": {
                        "scene_no": { "type": "INTEGER" },
                        "text": string,
                        "image_prompt": string,
                        "quiz": {
                            "type": "OBJECT",
                            "nullable": true,
                            "required": QUIZ_FIELDS,
                            "properties": quiz_props,
                        }
                    }
                }
            }
        }
    })
}
