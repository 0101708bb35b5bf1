//! Typed storyboard scene records and the consistency enforcer.
//!
//! The story model is free to invent actions, dialogue and camera work, but
//! the character's identity fields are owned by the user's
//! [`CharacterProfile`] and are force-overwritten after every generation
//! pass. The record is a typed tree rather than a bag of path strings, so a
//! misspelled field is a compile error instead of a silent no-op.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User-owned source of truth for the locked character fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub appearance: String,
    pub outfit_top: String,
    pub outfit_bottom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionFlow {
    #[serde(default)]
    pub pre_action: String,
    #[serde(default)]
    pub main_action: String,
    #[serde(default)]
    pub post_action: String,
    #[serde(default)]
    pub micro_transition: String,
    #[serde(default)]
    pub camera_support_motion: String,
}

/// Per-character lock block. `hair` carries the full appearance
/// description; the wire name is kept for compatibility with the blueprint
/// schema the story model is prompted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CharacterSheet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hair: String,
    #[serde(default)]
    pub outfit_top: String,
    #[serde(default)]
    pub outfit_bottom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_flow: Option<ActionFlow>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CharacterLock {
    #[serde(rename = "CHAR_A", default, skip_serializing_if = "Option::is_none")]
    pub char_a: Option<CharacterSheet>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BackgroundLock {
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub scenery: String,
    #[serde(default)]
    pub lighting: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CameraSpec {
    #[serde(default)]
    pub framing: String,
    #[serde(default)]
    pub movement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DialogueLine {
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub voice_profile: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub line: String,
}

/// One storyboard scene as produced by the story model.
///
/// Every section is optional on input; the model regularly drops blocks it
/// considers implied. [`enforce`] reconstructs the locked sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneRecord {
    #[serde(default)]
    pub scene_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub visual_style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_lock: Option<CharacterLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_lock: Option<BackgroundLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraSpec>,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Overwrite the locked character fields of `scene` with the values from
/// `profile`, creating the lock structure when the model omitted it.
///
/// Pure and idempotent: the input is left untouched and
/// `enforce(&enforce(s, p), p) == enforce(s, p)`.
pub fn enforce(scene: &SceneRecord, profile: &CharacterProfile) -> SceneRecord {
    let mut out = scene.clone();
    let lock = out.character_lock.get_or_insert_with(CharacterLock::default);
    let sheet = lock.char_a.get_or_insert_with(CharacterSheet::default);
    sheet.name = profile.name.clone();
    sheet.hair = profile.appearance.clone();
    sheet.outfit_top = profile.outfit_top.clone();
    sheet.outfit_bottom = profile.outfit_bottom.clone();
    out
}

#[derive(Debug, thiserror::Error)]
pub enum SceneParseError {
    #[error("story model returned invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("story model returned {0}, expected an object or array of scenes")]
    UnexpectedShape(&'static str),
}

/// Strip a leading/trailing markdown code fence from model output.
///
/// Models frequently wrap JSON answers in ```` ```json ```` fences even
/// when told not to.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a story-model answer into scene records.
///
/// Accepts either a JSON array of scenes or a single scene object (the
/// model sometimes unwraps one-element answers).
pub fn parse_scenes(raw: &str) -> Result<Vec<SceneRecord>, SceneParseError> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))?;
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(_) => vec![value],
        Value::Null => return Err(SceneParseError::UnexpectedShape("null")),
        Value::Bool(_) => return Err(SceneParseError::UnexpectedShape("a boolean")),
        Value::Number(_) => return Err(SceneParseError::UnexpectedShape("a number")),
        Value::String(_) => return Err(SceneParseError::UnexpectedShape("a string")),
    };
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(SceneParseError::Json))
        .collect()
}

/// Collapse whitespace runs and cap length before handing a prompt to the
/// image endpoint; long multi-line prompts trip request validation.
pub fn sanitize_prompt(raw: &str, max_chars: usize) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

// ---- prompt builders ----

/// Blueprint the story model is prompted with. Scene answers must follow
/// this shape so that [`parse_scenes`] and the lock sections line up.
pub const SCENE_BLUEPRINT: &str = r#"{
  "system": "Rahyang Storyboard - Absolute Consistency",
  "description": "Stateless cinematic storytelling engine.",
  "scene_rules": {
    "format": "Text-to-Video",
    "continuity_bridging": "pre_action -> main_action -> post_action -> micro_transition",
    "mandatory_footer": "Audio: Audio in bahasa"
  },
  "scene_blueprint_template": {
    "scene_id": "S#",
    "duration_sec": 6,
    "visual_style": "3D cartoon cinematic animation, stylized, non-photorealistic, warm afternoon light. Dialogue must be Indonesian inside [ ... ].",
    "character_lock": {
      "CHAR_A": {
        "name": "Exact name",
        "age": "Child|Teen|Adult",
        "visual_dna_enforced": "TRUE",
        "action_flow": {
          "pre_action": "Short setup",
          "main_action": "Primary action",
          "post_action": "Bridge pose",
          "micro_transition": "Idle motion",
          "camera_support_motion": "Camera move"
        }
      }
    },
    "background_lock": {
      "setting": "Specific location name",
      "scenery": "Key visual elements",
      "lighting": "Time of day/mood"
    },
    "camera": {
      "framing": "Shot type",
      "movement": "Pan/track/dolly/zoom"
    },
    "dialogue": [
      {
        "speaker": "CHAR_A",
        "voice_profile": "Gender, Tone, Pace, Emotion (MUST BE CONSISTENT)",
        "language": "id-ID",
        "line": "[Short Indonesian line]"
      }
    ]
  }
}"#;

/// Vision prompt that turns a character photo into the locked sheet fields.
pub fn character_analysis_prompt() -> String {
    [
        "Analyze the character in this image for a 3D Animation Character Sheet.",
        "Return a JSON object with these keys (translate description to Indonesian mixed with English terms for best prompting):",
        "{",
        "  \"appearance\": \"Detailed face description (eyes, nose, jawline, distinct features), hair style and color, skin tone. Be very specific to lock consistency.\",",
        "  \"outfit_top\": \"Detailed description of top clothing\",",
        "  \"outfit_bottom\": \"Detailed description of bottom clothing/pants/shoes\"",
        "}",
        "RETURN ONLY JSON.",
    ]
    .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryMode {
    /// Five scenes that open the story.
    Initial,
    /// One scene that advances the plot.
    Next,
    /// One scene that ends the story.
    Closing,
}

/// How many trailing scenes are replayed to the model as story context.
const ROLLING_CONTEXT_SCENES: usize = 3;

/// Build the story-generation prompt for one mode.
///
/// `existing` is only consulted for [`StoryMode::Next`] and
/// [`StoryMode::Closing`]; the last [`ROLLING_CONTEXT_SCENES`] entries are
/// summarized as action + dialogue pairs.
pub fn story_prompt(
    mode: StoryMode,
    title: &str,
    profile: &CharacterProfile,
    style_name: &str,
    existing: &[SceneRecord],
) -> String {
    let anchor = format!(
        "*** VISUAL DNA ANCHOR (HIGHEST PRIORITY) ***\n\
         - Face/Hair: {}\n\
         - Top Outfit: {}\n\
         - Bottom Outfit: {}",
        profile.appearance, profile.outfit_top, profile.outfit_bottom
    );

    let story_so_far = rolling_context(existing);

    let (task, context) = match mode {
        StoryMode::Initial => (
            "Generate 5 INITIAL SCENES to start the story.",
            format!(
                "- Story Title: \"{title}\"\n- Main Character Name: \"{}\"\n{anchor}\n- Visual Style: {style_name}",
                profile.name
            ),
        ),
        StoryMode::Next => (
            "Generate 1 NEW SCENE that advances the plot.",
            format!("- Story Title: \"{title}\"\n{anchor}\n- STORY_SO_FAR (Context):\n{story_so_far}"),
        ),
        StoryMode::Closing => (
            "Generate 1 FINAL SCENE to END the story.",
            format!("- Story Title: \"{title}\"\n{anchor}\n- STORY_SO_FAR:\n{story_so_far}"),
        ),
    };

    format!(
        "{SCENE_BLUEPRINT}\n\n---\nINPUT CONTEXT:\n{context}\n\nTASK:\n{task}\n\n\
         CRITICAL REQUIREMENTS:\n\
         1. Output MUST be a valid JSON Array.\n\
         2. Dialogue MUST be Indonesian [ ... ].\n\
         3. Focus on ACTION and PLOT. Do not worry about describing the clothes repeatedly, the system will handle it.\n\n\
         RETURN ONLY JSON."
    )
}

fn rolling_context(existing: &[SceneRecord]) -> String {
    let start = existing.len().saturating_sub(ROLLING_CONTEXT_SCENES);
    existing[start..]
        .iter()
        .enumerate()
        .map(|(offset, scene)| {
            let action = scene
                .character_lock
                .as_ref()
                .and_then(|lock| lock.char_a.as_ref())
                .and_then(|sheet| sheet.action_flow.as_ref())
                .map(|flow| flow.main_action.as_str())
                .filter(|action| !action.is_empty())
                .unwrap_or("Unknown action");
            let dialogue = scene
                .dialogue
                .first()
                .map(|line| line.line.as_str())
                .filter(|line| !line.is_empty())
                .unwrap_or("No dialogue");
            format!(
                "Scene {}: Action=\"{action}\" | Dialogue=\"{dialogue}\"",
                start + offset + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Still-image preview prompt for one scene, already sanitized for the
/// image endpoint.
pub fn scene_preview_prompt(scene: &SceneRecord, style_name: &str) -> String {
    let sheet = locked_sheet(scene);
    let background = scene.background_lock.clone().unwrap_or_default();
    let action = sheet
        .action_flow
        .as_ref()
        .map(|flow| flow.main_action.clone())
        .unwrap_or_default();
    let raw = format!(
        "{style_name}, Character: {}, wearing {} and {}. Action: {action}. Setting: {}, {}, {}. \
         Cinematic framing, high quality, 3D render.",
        sheet.hair,
        sheet.outfit_top,
        sheet.outfit_bottom,
        background.setting,
        background.scenery,
        background.lighting,
    );
    sanitize_prompt(&raw, 500)
}

/// Video prompt for one scene, with the dialogue instruction injected when
/// a spoken line exists.
pub fn scene_video_prompt(scene: &SceneRecord, style_name: &str) -> String {
    let sheet = locked_sheet(scene);
    let background = scene.background_lock.clone().unwrap_or_default();
    let action = sheet
        .action_flow
        .as_ref()
        .map(|flow| flow.main_action.clone())
        .unwrap_or_default();
    let mut prompt = format!(
        "3D Cinematic Animation.\n\
         Character: {}, wearing {} and {}.\n\
         Action: {action}.\n\
         Setting: {}, {}, {}.\n\
         Style: {style_name}, High quality, 4k resolution.",
        sheet.hair,
        sheet.outfit_top,
        sheet.outfit_bottom,
        background.setting,
        background.scenery,
        background.lighting,
    );
    if let Some(line) = scene.dialogue.first().filter(|line| !line.line.is_empty()) {
        let voice = if line.voice_profile.is_empty() {
            "Normal"
        } else {
            line.voice_profile.as_str()
        };
        prompt.push_str(&format!(
            "\n\nCRITICAL INSTRUCTION: The character is speaking this line: \"{}\". \
             Expression/Tone: {voice}. Ensure lip movement matches speech.",
            line.line
        ));
    }
    prompt
}

fn locked_sheet(scene: &SceneRecord) -> CharacterSheet {
    scene
        .character_lock
        .as_ref()
        .and_then(|lock| lock.char_a.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CharacterProfile {
        CharacterProfile {
            name: "Budi".to_string(),
            appearance: "Anak kecil Indonesia, rambut hitam pendek, kulit sawo matang".to_string(),
            outfit_top: "Kaos merah polos".to_string(),
            outfit_bottom: "Celana pendek biru jeans".to_string(),
        }
    }

    #[test]
    fn enforce_overwrites_locked_fields_and_keeps_the_rest() {
        let raw = r#"{
            "scene_id": "S1",
            "duration_sec": 6,
            "character_lock": {
                "CHAR_A": {
                    "name": "Bobi",
                    "hair": "invented hair",
                    "outfit_top": "green hoodie",
                    "outfit_bottom": "black pants",
                    "age": "Child",
                    "action_flow": { "main_action": "runs across the yard" }
                }
            },
            "dialogue": [{ "speaker": "CHAR_A", "line": "[Ayo main!]" }]
        }"#;
        let scene: SceneRecord = serde_json::from_str(raw).unwrap();
        let locked = enforce(&scene, &profile());

        let sheet = locked.character_lock.unwrap().char_a.unwrap();
        assert_eq!(sheet.name, "Budi");
        assert_eq!(
            sheet.hair,
            "Anak kecil Indonesia, rambut hitam pendek, kulit sawo matang"
        );
        assert_eq!(sheet.outfit_top, "Kaos merah polos");
        assert_eq!(sheet.outfit_bottom, "Celana pendek biru jeans");
        // Model-owned fields survive.
        assert_eq!(sheet.age.as_deref(), Some("Child"));
        assert_eq!(
            sheet.action_flow.unwrap().main_action,
            "runs across the yard"
        );
        assert_eq!(locked.dialogue[0].line, "[Ayo main!]");
        // The input scene is untouched.
        assert_eq!(
            scene.character_lock.as_ref().unwrap().char_a.as_ref().unwrap().name,
            "Bobi"
        );
    }

    #[test]
    fn enforce_creates_missing_lock_structure() {
        let scene = SceneRecord {
            scene_id: "S2".to_string(),
            ..SceneRecord::default()
        };
        let locked = enforce(&scene, &profile());
        let sheet = locked.character_lock.unwrap().char_a.unwrap();
        assert_eq!(sheet.name, "Budi");
        assert_eq!(sheet.outfit_bottom, "Celana pendek biru jeans");
    }

    #[test]
    fn enforce_is_idempotent() {
        let scene: SceneRecord = serde_json::from_str(
            r#"{ "scene_id": "S1", "character_lock": { "CHAR_A": { "name": "X" } } }"#,
        )
        .unwrap();
        let once = enforce(&scene, &profile());
        let twice = enforce(&once, &profile());
        assert_eq!(once, twice);
    }

    #[test]
    fn parse_accepts_fenced_array() {
        let raw = "```json\n[{\"scene_id\": \"S1\"}, {\"scene_id\": \"S2\"}]\n```";
        let scenes = parse_scenes(raw).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[1].scene_id, "S2");
    }

    #[test]
    fn parse_promotes_single_object_to_array() {
        let scenes = parse_scenes("{\"scene_id\": \"S9\"}").unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].scene_id, "S9");
    }

    #[test]
    fn parse_rejects_scalar_answers() {
        assert!(matches!(
            parse_scenes("\"just text\""),
            Err(SceneParseError::UnexpectedShape("a string"))
        ));
    }

    #[test]
    fn sanitize_collapses_whitespace_and_caps_length() {
        let raw = "  a\n\n  b\tc  ";
        assert_eq!(sanitize_prompt(raw, 500), "a b c");
        assert_eq!(sanitize_prompt("abcdef", 3), "abc");
    }

    #[test]
    fn story_prompt_embeds_anchor_and_rolling_context() {
        let mut scenes = Vec::new();
        for index in 1..=5 {
            scenes.push(SceneRecord {
                scene_id: format!("S{index}"),
                character_lock: Some(CharacterLock {
                    char_a: Some(CharacterSheet {
                        action_flow: Some(ActionFlow {
                            main_action: format!("action {index}"),
                            ..ActionFlow::default()
                        }),
                        ..CharacterSheet::default()
                    }),
                    ..CharacterLock::default()
                }),
                ..SceneRecord::default()
            });
        }
        let prompt = story_prompt(StoryMode::Next, "Petualangan", &profile(), "Pixar", &scenes);
        assert!(prompt.contains("VISUAL DNA ANCHOR"));
        assert!(prompt.contains("Kaos merah polos"));
        // Only the last three scenes are replayed, numbered from their
        // original position.
        assert!(!prompt.contains("Scene 2:"));
        assert!(prompt.contains("Scene 3: Action=\"action 3\""));
        assert!(prompt.contains("Scene 5: Action=\"action 5\""));
    }

    #[test]
    fn video_prompt_injects_dialogue_instruction() {
        let scene: SceneRecord = serde_json::from_str(
            r#"{
                "character_lock": { "CHAR_A": { "hair": "short black hair", "outfit_top": "red shirt", "outfit_bottom": "jeans" } },
                "background_lock": { "setting": "schoolyard", "scenery": "swings", "lighting": "afternoon" },
                "dialogue": [{ "speaker": "CHAR_A", "voice_profile": "Child, cheerful", "line": "[Halo!]" }]
            }"#,
        )
        .unwrap();
        let prompt = scene_video_prompt(&scene, "Pixar");
        assert!(prompt.contains("speaking this line: \"[Halo!]\""));
        assert!(prompt.contains("Child, cheerful"));
    }

    #[test]
    fn preview_prompt_is_single_line_and_bounded() {
        let scene = SceneRecord::default();
        let prompt = scene_preview_prompt(&scene, "Pixar");
        assert!(!prompt.contains('\n'));
        assert!(prompt.chars().count() <= 500);
        assert!(prompt.contains("Pixar"));
    }
}
