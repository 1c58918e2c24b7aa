//! Submission input rules: script types, visibility, and validation.
//!
//! All enums are closed; unknown variants fail serde deserialization.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a visual prompt in characters.
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Durations (seconds) a generation may be requested for.
pub const VALID_DURATIONS: &[i32] = &[60, 120, 180, 300];

/// Maximum length of a video title derived from the visual prompt.
pub const MAX_TITLE_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Script type
// ---------------------------------------------------------------------------

/// How the meditation script is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    /// The script is produced by the text-generation provider.
    AiGenerated,
    /// The user supplied the full script text.
    UserProvided,
    /// The script comes from a pre-written template.
    Template,
}

impl ScriptType {
    /// Lower-snake name as stored/reported.
    pub fn name(self) -> &'static str {
        match self {
            Self::AiGenerated => "ai_generated",
            Self::UserProvided => "user_provided",
            Self::Template => "template",
        }
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Who may see the finished video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the visual prompt: non-empty, at most [`MAX_PROMPT_CHARS`]
/// characters after trimming.
pub fn validate_visual_prompt(prompt: &str) -> Result<(), CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "visual_prompt must not be empty".to_string(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(CoreError::Validation(format!(
            "visual_prompt must not exceed {MAX_PROMPT_CHARS} characters (got {chars})"
        )));
    }
    Ok(())
}

/// Validate that the duration is one of the supported values.
pub fn validate_duration(duration_seconds: i32) -> Result<(), CoreError> {
    if VALID_DURATIONS.contains(&duration_seconds) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "duration_seconds must be one of {VALID_DURATIONS:?} (got {duration_seconds})"
        )))
    }
}

/// Validate the script-type / script-content pairing.
///
/// `user_provided` and `template` submissions must carry a non-empty
/// script; `ai_generated` submissions may omit it.
pub fn validate_script_content(
    script_type: ScriptType,
    script_content: Option<&str>,
) -> Result<(), CoreError> {
    match script_type {
        ScriptType::AiGenerated => Ok(()),
        ScriptType::UserProvided | ScriptType::Template => {
            match script_content {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err(CoreError::Validation(format!(
                    "script_content is required when script_type is {}",
                    script_type.name()
                ))),
            }
        }
    }
}

/// Derive a video title from the visual prompt, truncated on a character
/// boundary to [`MAX_TITLE_CHARS`].
pub fn title_from_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_TITLE_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
