//! [`ContentGenerator`] backed by the DeepSeek chat completions API.

use super::{parse_characters, parse_chapter, parse_json, ChapterRequest, ContentGenerator, GenerationError};
use crate::extract::ChapterDraft;
use crate::memory::{CharacterProfile, WorldView};
use crate::plan::Outline;
use crate::validate::CreativeBrief;
use ::deepseek::{Client, FinishReason, Message, Request};
use async_trait::async_trait;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "你是一个专业的小说创作助手。严格按照要求的JSON格式输出，不要输出任何其他文本。";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Generates novel content through a chat completions client.
#[derive(Clone)]
pub struct DeepSeekGenerator {
    client: Client,
    temperature: f32,
    max_tokens: usize,
}

impl DeepSeekGenerator {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build from `DEEPSEEK_API_KEY`.
    pub fn from_env() -> Result<Self, GenerationError> {
        Ok(Self::new(Client::from_env()?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn ask(&self, task: &str, prompt: String) -> Result<String, GenerationError> {
        let request = Request::new(vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_json_output();

        let response = self.client.complete(request).await?;
        debug!(
            task,
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "generation finished"
        );
        if response.finish_reason == FinishReason::Length {
            warn!(task, "response hit the token limit and may be truncated");
        }
        Ok(response.content)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[async_trait]
impl ContentGenerator for DeepSeekGenerator {
    async fn generate_outline(&self, brief: &CreativeBrief) -> Result<Outline, GenerationError> {
        let prompt = format!(
            r#"请基于以下创意生成一个详细的小说大纲。

## 创意灵感
{idea}

## 创作要求
小说类型：{novel_type}
目标字数：{words}字
写作风格：{style}

## 输出格式（JSON对象）
{{
  "title": "小说标题",
  "theme": "核心主题",
  "summary": "300-500字的故事梗概",
  "target_words": {words},
  "estimated_chapters": 章节数,
  "structure": {{"第一幕": "开端", "第二幕": "发展", "第三幕": "高潮与结局"}},
  "key_plot_points": ["关键情节点1", "关键情节点2", "关键情节点3"],
  "main_characters": ["主要人物姓名"]
}}"#,
            idea = brief.idea(),
            novel_type = brief.novel_type(),
            words = brief.target_words(),
            style = brief.style(),
        );

        let raw = self.ask("outline", prompt).await?;
        let mut outline: Outline = parse_json(&raw)?;
        if outline.target_words == 0 {
            outline.target_words = brief.target_words();
        }
        Ok(outline)
    }

    async fn generate_characters(
        &self,
        outline: &Outline,
    ) -> Result<Vec<CharacterProfile>, GenerationError> {
        let prompt = format!(
            r#"基于以下小说大纲，生成3-5个主要人物设定。

## 大纲
{outline}

## 输出格式（JSON对象）
{{
  "characters": [
    {{
      "name": "姓名",
      "age": "年龄",
      "gender": "性别",
      "appearance": "外貌特征",
      "identity": "身份背景",
      "personality": "性格特点",
      "motivation": "核心动机",
      "background": "过往经历",
      "growth_arc": "成长弧线",
      "abilities": ["能力"],
      "weaknesses": ["弱点"],
      "relationships": {{"其他人物": "关系"}},
      "importance": 1到10的整数
    }}
  ]
}}
主角的importance为10。"#,
            outline = to_json(outline),
        );

        let raw = self.ask("characters", prompt).await?;
        parse_characters(&raw)
    }

    async fn generate_worldview(
        &self,
        outline: &Outline,
        characters: &[CharacterProfile],
    ) -> Result<WorldView, GenerationError> {
        let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        let prompt = format!(
            r#"基于以下小说大纲和人物，构建详细的世界观设定。

## 大纲
{outline}

## 人物
{names}

## 输出格式（JSON对象）
{{
  "basic_setting": "基本设定",
  "time_period": "时代背景",
  "geography": "地理环境",
  "power_system": "力量体系",
  "social_structure": "社会结构",
  "culture": "文化风俗",
  "special_rules": "特殊规则",
  "history": "历史背景",
  "factions": ["势力"],
  "customs": ["风俗"],
  "taboos": ["禁忌"],
  "limitations": ["限制"]
}}"#,
            outline = to_json(outline),
            names = names.join("、"),
        );

        let raw = self.ask("worldview", prompt).await?;
        parse_json(&raw)
    }

    async fn generate_chapter(
        &self,
        request: &ChapterRequest<'_>,
    ) -> Result<ChapterDraft, GenerationError> {
        let cast: Vec<String> = request
            .characters
            .iter()
            .map(|c| format!("- {}：{}，{}", c.name, c.identity, c.personality))
            .collect();
        let prompt = format!(
            r#"基于以下信息，创作小说第{number}章，目标字数{words}字。

## 小说大纲
标题：{title}
主题：{theme}
梗概：{summary}

## 主要人物
{cast}

## 相关上下文
{context}

## 要求
1. 保持人物性格和行为一致
2. 推进情节发展
3. 符合故事整体风格
4. 埋下后续情节的伏笔

## 输出格式（JSON对象）
{{
  "title": "章节标题",
  "content": "章节正文",
  "summary": "本章摘要（100-200字）",
  "key_events": ["本章关键事件"],
  "character_development": {{"人物姓名": "发展描述"}}
}}"#,
            number = request.chapter_number,
            words = request.target_words,
            title = request.outline.title,
            theme = request.outline.theme,
            summary = request.outline.summary,
            cast = cast.join("\n"),
            context = request.context,
        );

        let raw = self.ask("chapter", prompt).await?;
        parse_chapter(&raw)
    }
}
