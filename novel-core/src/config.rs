//! Project configuration.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`NOVEL_*`)
//! 2. The TOML file passed to [`NovelConfig::load`]
//! 3. Compiled defaults
//!
//! The API key is never read from the file; it comes from `DEEPSEEK_API_KEY`.

use crate::batch::BatchConfig;
use crate::context::ContextConfig;
use crate::generation::{DeepSeekGenerator, GenerationError};
use crate::persist::{MemoryDir, DEFAULT_BACKUP_RETENTION};
use crate::plan::DEFAULT_CHAPTER_WORDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default config file name looked up by the command line.
pub const CONFIG_FILE: &str = "novel.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: deepseek::DEFAULT_MODEL.to_string(),
            base_url: deepseek::DEFAULT_BASE_URL.to_string(),
            timeout_secs: deepseek::DEFAULT_TIMEOUT.as_secs(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub target_words: u32,
    pub chapter_words: u32,
    pub concurrency: usize,
    pub chapter_timeout_secs: u64,
    pub run_consistency: bool,
    pub output_dir: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            target_words: 100_000,
            chapter_words: DEFAULT_CHAPTER_WORDS,
            concurrency: 3,
            chapter_timeout_secs: 30,
            run_consistency: true,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub memory_dir: PathBuf,
    pub context_window: u32,
    pub backup_retention: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_dir: PathBuf::from("./memory"),
            context_window: 5,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelConfig {
    pub api: ApiConfig,
    pub generation: GenerationConfig,
    pub memory: MemoryConfig,
}

impl NovelConfig {
    /// Load from `path`, falling back to defaults if the file does not exist,
    /// then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            debug!(path = %path.display(), "loading config");
            Self::from_toml(&std::fs::read_to_string(path)?)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_vars(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `NOVEL_*` overrides from `(name, value)` pairs.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in vars {
            let applied = match name.as_str() {
                "NOVEL_MODEL" => {
                    self.api.model = value.clone();
                    true
                }
                "NOVEL_BASE_URL" => {
                    self.api.base_url = value.clone();
                    true
                }
                "NOVEL_MEMORY_DIR" => {
                    self.memory.memory_dir = PathBuf::from(&value);
                    true
                }
                "NOVEL_OUTPUT_DIR" => {
                    self.generation.output_dir = Some(PathBuf::from(&value));
                    true
                }
                "NOVEL_CONCURRENCY" => set_parsed(&mut self.generation.concurrency, &value),
                "NOVEL_CHAPTER_WORDS" => set_parsed(&mut self.generation.chapter_words, &value),
                "NOVEL_CHAPTER_TIMEOUT_SECS" => {
                    set_parsed(&mut self.generation.chapter_timeout_secs, &value)
                }
                _ => continue,
            };
            if !applied {
                warn!(%name, %value, "ignoring unparseable override");
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "generation.concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.generation.chapter_words == 0 {
            return Err(ConfigError::Invalid {
                field: "generation.chapter_words",
                message: "must be greater than 0".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(ConfigError::Invalid {
                field: "api.temperature",
                message: "must be between 0.0 and 2.0".to_string(),
            });
        }
        if self.memory.backup_retention == 0 {
            return Err(ConfigError::Invalid {
                field: "memory.backup_retention",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn memory_dir(&self) -> MemoryDir {
        MemoryDir::new(&self.memory.memory_dir).with_backup_retention(self.memory.backup_retention)
    }

    pub fn batch_config(&self) -> BatchConfig {
        let mut config = BatchConfig::default()
            .with_concurrency(self.generation.concurrency)
            .with_chapter_timeout(Duration::from_secs(self.generation.chapter_timeout_secs))
            .with_chapter_words(self.generation.chapter_words)
            .with_consistency(self.generation.run_consistency)
            .with_context(ContextConfig::default().with_window(self.memory.context_window));
        if let Some(dir) = &self.generation.output_dir {
            config = config.with_output_dir(dir);
        }
        config
    }

    /// A DeepSeek generator configured from `[api]`, keyed from the environment.
    pub fn generator(&self) -> Result<DeepSeekGenerator, GenerationError> {
        let client = deepseek::Client::from_env()?
            .with_model(&self.api.model)
            .with_base_url(&self.api.base_url)
            .with_timeout(Duration::from_secs(self.api.timeout_secs));
        Ok(DeepSeekGenerator::new(client)
            .with_temperature(self.api.temperature)
            .with_max_tokens(self.api.max_tokens))
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) -> bool {
    match value.trim().parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = NovelConfig::default();
        assert_eq!(config.api.model, "deepseek-chat");
        assert_eq!(config.api.base_url, "https://api.deepseek.com/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.generation.target_words, 100_000);
        assert_eq!(config.generation.chapter_words, 3000);
        assert_eq!(config.generation.concurrency, 3);
        assert_eq!(config.memory.memory_dir, PathBuf::from("./memory"));
        assert_eq!(config.memory.context_window, 5);
        assert_eq!(config.memory.backup_retention, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NovelConfig::from_toml(
            r#"
            [generation]
            concurrency = 1
            output_dir = "chapters"

            [memory]
            memory_dir = "/tmp/story"
            "#,
        )
        .unwrap();
        assert_eq!(config.generation.concurrency, 1);
        assert_eq!(config.generation.output_dir, Some(PathBuf::from("chapters")));
        assert_eq!(config.generation.chapter_words, 3000);
        assert_eq!(config.memory.memory_dir, PathBuf::from("/tmp/story"));
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            NovelConfig::from_toml("[generation\nconcurrency = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            NovelConfig::from_toml("[generation]\nconcurrency = 0"),
            Err(ConfigError::Invalid {
                field: "generation.concurrency",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = NovelConfig::load(temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(NovelConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides() {
        let mut config = NovelConfig::default();
        config.apply_vars([
            ("NOVEL_CONCURRENCY".to_string(), "5".to_string()),
            ("NOVEL_CHAPTER_WORDS".to_string(), "lots".to_string()),
            ("NOVEL_MEMORY_DIR".to_string(), "elsewhere".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        assert_eq!(config.generation.concurrency, 5);
        assert_eq!(config.generation.chapter_words, 3000);
        assert_eq!(config.memory.memory_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn test_batch_config() {
        let mut config = NovelConfig::default();
        config.generation.output_dir = Some(PathBuf::from("out"));
        config.memory.context_window = 2;
        let batch = config.batch_config();
        assert_eq!(batch.concurrency, 3);
        assert_eq!(batch.chapter_timeout, Duration::from_secs(30));
        assert_eq!(batch.output_dir, Some(PathBuf::from("out")));
        assert_eq!(batch.context.window, 2);
    }
}
