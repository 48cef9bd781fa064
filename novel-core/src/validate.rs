//! Input validation, applied before any generation call.

use crate::text::cjk_count;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_TARGET_WORDS: u32 = 10_000;
pub const MAX_TARGET_WORDS: u32 = 5_000_000;
pub const MIN_BRIEF_CHARS: usize = 20;
pub const MAX_BRIEF_CHARS: usize = 5_000;
pub const MIN_BRIEF_CJK: usize = 10;
pub const MAX_CHAPTER_NUMBER: u32 = 1_000;
pub const MIN_API_KEY_LEN: usize = 20;

/// Rejected input, with the specific reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Creative brief is empty")]
    EmptyBrief,

    #[error("Creative brief must be {min}-{max} characters, got {0}", min = MIN_BRIEF_CHARS, max = MAX_BRIEF_CHARS)]
    BriefLength(usize),

    #[error("Creative brief needs at least {min} Chinese characters, got {0}", min = MIN_BRIEF_CJK)]
    BriefContent(usize),

    #[error("Target word count must be {min}-{max}, got {0}", min = MIN_TARGET_WORDS, max = MAX_TARGET_WORDS)]
    TargetWords(u64),

    #[error("Unknown novel type '{0}'")]
    UnknownNovelType(String),

    #[error("Unknown writing style '{0}'")]
    UnknownStyle(String),

    #[error("Chapter number must be 1-{max}, got {0}", max = MAX_CHAPTER_NUMBER)]
    ChapterNumber(u32),

    #[error("API key is empty")]
    EmptyApiKey,

    #[error("API key must start with 'sk-' and be at least {min} characters", min = MIN_API_KEY_LEN)]
    ApiKeyShape,
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident, $error:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label() == s)
                    .ok_or_else(|| ValidationError::$error(s.to_string()))
            }
        }
    };
}

labelled_enum!(
    /// Genre of the novel.
    NovelType, UnknownNovelType {
        Fantasy => "玄幻",
        Xianxia => "仙侠",
        Urban => "都市",
        SciFi => "科幻",
        Mystery => "悬疑",
        Romance => "言情",
        Historical => "历史",
        Military => "军事",
        Wuxia => "武侠",
        Other => "其他",
    }
);

labelled_enum!(
    /// Prose style requested from the generator.
    WritingStyle, UnknownStyle {
        Humorous => "轻松幽默",
        Serious => "严肃正剧",
        Literary => "文艺细腻",
        FastPaced => "快节奏",
        SlowBurn => "慢热细腻",
        Ensemble => "群像描写",
    }
);

/// A validated request to start a novel.
///
/// Only [`CreativeBrief::new`] builds one, so holding a brief means it passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreativeBrief {
    idea: String,
    target_words: u32,
    novel_type: NovelType,
    style: WritingStyle,
}

impl CreativeBrief {
    pub fn new(
        idea: &str,
        target_words: u64,
        novel_type: NovelType,
        style: WritingStyle,
    ) -> Result<Self, ValidationError> {
        let idea = validate_idea(idea)?;
        let target_words = validate_target_words(target_words)?;
        Ok(Self {
            idea,
            target_words,
            novel_type,
            style,
        })
    }

    pub fn idea(&self) -> &str {
        &self.idea
    }

    pub fn target_words(&self) -> u32 {
        self.target_words
    }

    pub fn novel_type(&self) -> NovelType {
        self.novel_type
    }

    pub fn style(&self) -> WritingStyle {
        self.style
    }
}

/// Trimmed creative idea of acceptable length and content.
pub fn validate_idea(idea: &str) -> Result<String, ValidationError> {
    let idea = idea.trim();
    if idea.is_empty() {
        return Err(ValidationError::EmptyBrief);
    }
    let chars = idea.chars().count();
    if !(MIN_BRIEF_CHARS..=MAX_BRIEF_CHARS).contains(&chars) {
        return Err(ValidationError::BriefLength(chars));
    }
    let cjk = cjk_count(idea);
    if cjk < MIN_BRIEF_CJK {
        return Err(ValidationError::BriefContent(cjk));
    }
    Ok(idea.to_string())
}

pub fn validate_target_words(words: u64) -> Result<u32, ValidationError> {
    if (u64::from(MIN_TARGET_WORDS)..=u64::from(MAX_TARGET_WORDS)).contains(&words) {
        Ok(words as u32)
    } else {
        Err(ValidationError::TargetWords(words))
    }
}

pub fn validate_chapter_number(chapter: u32) -> Result<u32, ValidationError> {
    if (1..=MAX_CHAPTER_NUMBER).contains(&chapter) {
        Ok(chapter)
    } else {
        Err(ValidationError::ChapterNumber(chapter))
    }
}

/// Shape check only; use `deepseek::Client::verify_key` to ask the provider.
pub fn validate_api_key(key: &str) -> Result<(), ValidationError> {
    let key = key.trim();
    if key.is_empty() {
        Err(ValidationError::EmptyApiKey)
    } else if !key.starts_with("sk-") || key.chars().count() < MIN_API_KEY_LEN {
        Err(ValidationError::ApiKeyShape)
    } else {
        Ok(())
    }
}
