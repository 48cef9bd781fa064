//! The content generation service the core depends on.
//!
//! Every generated artifact comes back as JSON text. Anything that does not
//! parse into the expected shape becomes [`GenerationError::Malformed`]
//! carrying the raw text; nothing here panics on bad output.

mod deepseek;

pub use self::deepseek::DeepSeekGenerator;

use crate::extract::ChapterDraft;
use crate::memory::{CharacterProfile, WorldView};
use crate::plan::Outline;
use crate::validate::CreativeBrief;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Failure of a generation call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Generation timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {reason}")]
    Malformed { reason: String, raw: String },

    #[error("Generator misconfigured: {0}")]
    Config(String),
}

impl GenerationError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        GenerationError::Malformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// The unparsed response text, for malformed responses.
    pub fn raw(&self) -> Option<&str> {
        match self {
            GenerationError::Malformed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<::deepseek::Error> for GenerationError {
    fn from(err: ::deepseek::Error) -> Self {
        use ::deepseek::Error;
        match err {
            Error::NoApiKey => GenerationError::Auth(err.to_string()),
            Error::Api { .. } if err.is_auth() => GenerationError::Auth(err.to_string()),
            Error::Api { status, message } => GenerationError::Api { status, message },
            Error::Network(message) => GenerationError::Network(message),
            Error::Timeout => GenerationError::Timeout,
            Error::Parse(reason) => GenerationError::malformed(reason, ""),
            Error::Config(message) => GenerationError::Config(message),
        }
    }
}

/// Everything needed to write one chapter.
#[derive(Debug, Clone, Copy)]
pub struct ChapterRequest<'a> {
    pub chapter_number: u32,
    pub outline: &'a Outline,
    pub characters: &'a [CharacterProfile],
    /// Rendered context bundle.
    pub context: &'a str,
    pub target_words: u32,
}

/// A service that writes outlines, casts, world views and chapters.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_outline(&self, brief: &CreativeBrief) -> Result<Outline, GenerationError>;

    async fn generate_characters(
        &self,
        outline: &Outline,
    ) -> Result<Vec<CharacterProfile>, GenerationError>;

    async fn generate_worldview(
        &self,
        outline: &Outline,
        characters: &[CharacterProfile],
    ) -> Result<WorldView, GenerationError>;

    async fn generate_chapter(
        &self,
        request: &ChapterRequest<'_>,
    ) -> Result<ChapterDraft, GenerationError>;
}

// ============================================================================
// Response parsing
// ============================================================================

/// Extract JSON from a response that may be wrapped in markdown code blocks.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Prose around a bare object or array
    if !text.starts_with(['{', '[']) {
        if let (Some(start), Some(end)) = (text.find(['{', '[']), text.rfind(['}', ']'])) {
            if start < end {
                return &text[start..=end];
            }
        }
    }

    text
}

/// Parse a response into `T`, keeping the raw text on failure.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    serde_json::from_str(extract_json(raw)).map_err(|e| GenerationError::malformed(e.to_string(), raw))
}

/// Accepts a bare list or an object with a `characters` list.
pub fn parse_characters(raw: &str) -> Result<Vec<CharacterProfile>, GenerationError> {
    let value: Value = parse_json(raw)?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut fields) => fields
            .remove("characters")
            .filter(Value::is_array)
            .ok_or_else(|| GenerationError::malformed("expected a list of characters", raw))?,
        _ => return Err(GenerationError::malformed("expected a list of characters", raw)),
    };

    let characters: Vec<CharacterProfile> =
        serde_json::from_value(list).map_err(|e| GenerationError::malformed(e.to_string(), raw))?;
    if characters.is_empty() {
        return Err(GenerationError::malformed("no characters returned", raw));
    }
    Ok(characters)
}

/// A chapter must at least have content.
pub fn parse_chapter(raw: &str) -> Result<ChapterDraft, GenerationError> {
    let draft: ChapterDraft = parse_json(raw)?;
    if draft.content.trim().is_empty() {
        return Err(GenerationError::malformed("chapter has no content", raw));
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"title": "山海行"}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_code_block() {
        let text = "Here you go:\n```json\n{\"title\": \"山海行\"}\n```";
        assert_eq!(extract_json(text), r#"{"title": "山海行"}"#);

        let text = "```\n[1, 2]\n```";
        assert_eq!(extract_json(text), "[1, 2]");
    }

    #[test]
    fn test_extract_json_surrounded_by_prose() {
        let text = "好的，以下是大纲：{\"title\": \"山海行\"} 希望有帮助";
        assert_eq!(extract_json(text), r#"{"title": "山海行"}"#);
    }

    #[test]
    fn test_malformed_keeps_raw() {
        let err = parse_json::<Outline>("这不是JSON").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed { .. }));
        assert_eq!(err.raw(), Some("这不是JSON"));
    }

    #[test]
    fn test_parse_characters_shapes() {
        let bare = parse_characters(r#"[{"name": "林风"}]"#).unwrap();
        assert_eq!(bare[0].name, "林风");

        let wrapped = parse_characters(r#"{"characters": [{"name": "苏雪", "importance": 7}]}"#).unwrap();
        assert_eq!(wrapped[0].importance, 7);

        assert!(parse_characters(r#"{"name": "林风"}"#).is_err());
        assert!(parse_characters("[]").is_err());
    }

    #[test]
    fn test_parse_chapter_requires_content() {
        assert!(parse_chapter(r#"{"title": "第一章", "content": "  "}"#).is_err());
        let draft = parse_chapter(r#"{"title": "第一章", "content": "正文", "word_count": 2}"#).unwrap();
        assert_eq!(draft.content, "正文");
    }

    #[test]
    fn test_error_mapping() {
        let auth: GenerationError = ::deepseek::Error::Api {
            status: 401,
            message: "bad key".to_string(),
        }
        .into();
        assert!(matches!(auth, GenerationError::Auth(_)));

        let api: GenerationError = ::deepseek::Error::Api {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(api, GenerationError::Api { status: 500, .. }));

        let timeout: GenerationError = ::deepseek::Error::Timeout.into();
        assert_eq!(timeout, GenerationError::Timeout);
    }
}
