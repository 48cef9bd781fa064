//! Context assembler: the bounded text bundle handed to chapter generation.
//!
//! Assembly is a pure function of the memory and the chapter number. It
//! never calls the network.

use crate::memory::NovelMemory;
use crate::relevance::{RelevanceEngine, Selection};
use crate::text::truncate_chars;
use serde_json::Value;
use std::fmt;

/// Limits for the assembled context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Preceding chapter summaries to include.
    pub window: u32,
    pub summary_chars: usize,
    pub location_chars: usize,
    pub plot_limit: usize,
    /// List entries shown per world view list field.
    pub list_preview: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: 5,
            summary_chars: 200,
            location_chars: 100,
            plot_limit: 3,
            list_preview: 3,
        }
    }
}

impl ContextConfig {
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window;
        self
    }

    pub fn with_summary_chars(mut self, chars: usize) -> Self {
        self.summary_chars = chars;
        self
    }
}

/// One titled block of the context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSection {
    pub title: &'static str,
    pub lines: Vec<String>,
}

/// The assembled context for one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBundle {
    pub chapter: u32,
    pub sections: Vec<ContextSection>,
    pub selection: Selection,
}

impl ContextBundle {
    pub fn section(&self, title: &str) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContextBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "## {}", section.title)?;
            for line in &section.lines {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

pub const CORE_SETTINGS_TITLE: &str = "核心设定";
pub const WORLDVIEW_TITLE: &str = "世界观";
pub const CHARACTERS_TITLE: &str = "相关人物";
pub const SUMMARIES_TITLE: &str = "前情提要";
pub const TIMELINE_TITLE: &str = "时间线";
pub const LOCATIONS_TITLE: &str = "相关地点";
pub const PLOTS_TITLE: &str = "活跃情节线";

/// Builds a [`ContextBundle`] from the memory.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    engine: RelevanceEngine,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(engine: RelevanceEngine, config: ContextConfig) -> Self {
        Self { engine, config }
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn engine(&self) -> &RelevanceEngine {
        &self.engine
    }

    pub fn assemble(&self, memory: &NovelMemory, chapter: u32) -> ContextBundle {
        let selection = self.engine.select(memory, chapter);

        let sections = [
            (CORE_SETTINGS_TITLE, self.core_settings(memory)),
            (WORLDVIEW_TITLE, self.worldview(memory)),
            (CHARACTERS_TITLE, self.characters(memory, &selection)),
            (SUMMARIES_TITLE, self.summaries(memory, chapter)),
            (
                TIMELINE_TITLE,
                selection
                    .timeline
                    .iter()
                    .map(|e| format!("- 第{}章: {}", e.chapter, e.description))
                    .collect(),
            ),
            (LOCATIONS_TITLE, self.locations(memory, &selection)),
            (PLOTS_TITLE, self.plots(memory, &selection)),
        ]
        .into_iter()
        .filter(|(_, lines)| !lines.is_empty())
        .map(|(title, lines)| ContextSection { title, lines })
        .collect();

        ContextBundle {
            chapter,
            sections,
            selection,
        }
    }

    fn core_settings(&self, memory: &NovelMemory) -> Vec<String> {
        let mut lines = Vec::new();
        for (key, value) in memory.core_settings().context_entries() {
            match value {
                Value::Object(entries) => {
                    lines.push(format!("{key}:"));
                    for (k, v) in entries {
                        lines.push(format!("  - {k}: {}", value_text(v)));
                    }
                }
                other => lines.push(format!("- {key}: {}", value_text(other))),
            }
        }
        lines
    }

    fn worldview(&self, memory: &NovelMemory) -> Vec<String> {
        let worldview = memory.worldview();
        let mut lines: Vec<String> = worldview
            .text_fields()
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(label, value)| format!("- {label}: {value}"))
            .collect();
        for (label, items) in worldview.list_fields() {
            if !items.is_empty() {
                let shown: Vec<&str> = items
                    .iter()
                    .take(self.config.list_preview)
                    .map(String::as_str)
                    .collect();
                lines.push(format!("- {label}: {}", shown.join("、")));
            }
        }
        lines
    }

    fn characters(&self, memory: &NovelMemory, selection: &Selection) -> Vec<String> {
        let mut lines = Vec::new();
        for name in selection.character_names() {
            let Some(profile) = memory.character(name) else {
                continue;
            };
            lines.push(format!("### {}", profile.name));
            for (label, value) in [
                ("身份", profile.identity.as_str()),
                ("性格", profile.personality.as_str()),
                ("动机", profile.motivation.as_str()),
            ] {
                if !value.trim().is_empty() {
                    lines.push(format!("- {label}: {value}"));
                }
            }
            if let Some(note) = profile.latest_development() {
                lines.push(format!("- 最新发展: {}", note.development));
            }
        }
        lines
    }

    fn summaries(&self, memory: &NovelMemory, chapter: u32) -> Vec<String> {
        memory
            .recent_summaries(chapter, self.config.window)
            .into_iter()
            .map(|s| {
                format!(
                    "- 第{}章: {}",
                    s.chapter_number,
                    truncate_chars(&s.summary, self.config.summary_chars)
                )
            })
            .collect()
    }

    fn locations(&self, memory: &NovelMemory, selection: &Selection) -> Vec<String> {
        selection
            .locations
            .iter()
            .filter_map(|name| memory.locations().get(name))
            .map(|l| {
                format!(
                    "- {}: {}",
                    l.name,
                    truncate_chars(&l.description, self.config.location_chars)
                )
            })
            .collect()
    }

    fn plots(&self, memory: &NovelMemory, selection: &Selection) -> Vec<String> {
        selection
            .plots
            .iter()
            .filter_map(|name| memory.plots().iter().find(|p| &p.name == name))
            .take(self.config.plot_limit)
            .map(|p| format!("- {}: {}", p.name, p.status.label()))
            .collect()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
