//! Command parsing and execution.

use novel_core::batch::{BatchReport, ChapterOutcome};
use novel_core::consistency::{ChapterCheck, FullCheck};
use novel_core::memory::DEFAULT_SEARCH_LIMIT;
use novel_core::plan::PlanStatus;
use novel_core::validate::validate_api_key;
use novel_core::{CreativeBrief, NovelConfig, NovelProject, NovelType, WritingStyle};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Chapters written by `generate` when no range is given.
const DEFAULT_PENDING: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init {
        idea: String,
        words: Option<u64>,
        novel_type: NovelType,
        style: WritingStyle,
    },
    GenerateRange { start: u32, count: u32 },
    GeneratePending { limit: usize },
    Check { chapter: u32, file: PathBuf },
    FullCheck,
    Stats,
    Plan,
    Search { query: String, limit: usize },
    Export { path: PathBuf },
    Import { path: PathBuf },
    Clear { confirmed: bool },
    VerifyKey,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let (name, rest) = args.split_first().ok_or("missing command")?;
        let flags = Flags::new(rest);

        match name.as_str() {
            "init" => Ok(Command::Init {
                idea: flags.value("--idea")?.ok_or("init needs --idea")?,
                words: flags.parsed("--words")?,
                novel_type: flags.parsed("--type")?.unwrap_or(NovelType::Other),
                style: flags.parsed("--style")?.unwrap_or(WritingStyle::Serious),
            }),
            "generate" => match flags.parsed::<u32>("--start")? {
                Some(start) => Ok(Command::GenerateRange {
                    start,
                    count: flags.parsed("--count")?.unwrap_or(1),
                }),
                None => Ok(Command::GeneratePending {
                    limit: flags.parsed("--pending")?.unwrap_or(DEFAULT_PENDING),
                }),
            },
            "check" if flags.has("--full") => Ok(Command::FullCheck),
            "check" => {
                let positional = flags.positional();
                match positional.as_slice() {
                    [chapter, file] => Ok(Command::Check {
                        chapter: chapter
                            .parse()
                            .map_err(|_| format!("invalid chapter number '{chapter}'"))?,
                        file: PathBuf::from(file),
                    }),
                    _ => Err("usage: check <CHAPTER> <FILE> | check --full".to_string()),
                }
            }
            "stats" => Ok(Command::Stats),
            "plan" => Ok(Command::Plan),
            "search" => Ok(Command::Search {
                query: flags
                    .positional()
                    .first()
                    .map(|q| q.to_string())
                    .ok_or("search needs a query")?,
                limit: flags.parsed("--limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT),
            }),
            "export" => Ok(Command::Export {
                path: flags.positional().first().map(PathBuf::from).ok_or("export needs a path")?,
            }),
            "import" => Ok(Command::Import {
                path: flags.positional().first().map(PathBuf::from).ok_or("import needs a path")?,
            }),
            "clear" => Ok(Command::Clear {
                confirmed: flags.has("--yes"),
            }),
            "verify-key" => Ok(Command::VerifyKey),
            other => Err(format!("unknown command '{other}'")),
        }
    }

    fn needs_generator(&self) -> bool {
        matches!(
            self,
            Command::Init { .. } | Command::GenerateRange { .. } | Command::GeneratePending { .. }
        )
    }
}

/// `--flag value` pairs and bare arguments.
struct Flags<'a> {
    args: &'a [String],
}

impl<'a> Flags<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { args }
    }

    fn has(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    fn value(&self, flag: &str) -> Result<Option<String>, String> {
        match self.args.iter().position(|a| a == flag) {
            Some(i) => self
                .args
                .get(i + 1)
                .cloned()
                .map(Some)
                .ok_or_else(|| format!("{flag} needs a value")),
            None => Ok(None),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, flag: &str) -> Result<Option<T>, String> {
        match self.value(flag)? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| format!("invalid value '{raw}' for {flag}")),
            None => Ok(None),
        }
    }

    /// Arguments that are neither flags nor flag values.
    fn positional(&self) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut skip = false;
        for arg in self.args {
            if skip {
                skip = false;
            } else if arg.starts_with("--") {
                skip = !matches!(arg.as_str(), "--full" | "--yes");
            } else {
                out.push(arg.as_str());
            }
        }
        out
    }
}

// ============================================================================
// Execution
// ============================================================================

pub async fn run(command: Command, config: NovelConfig) -> Result<(), Box<dyn Error>> {
    if command == Command::VerifyKey {
        return verify_key().await;
    }

    let (project, warnings) = if command.needs_generator() {
        let generator = Arc::new(config.generator()?);
        NovelProject::open(config, generator).await?
    } else {
        NovelProject::open_read_only(config).await?
    };
    for warning in &warnings {
        eprintln!("[WARN] {warning}");
    }

    match command {
        Command::Init {
            idea,
            words,
            novel_type,
            style,
        } => {
            let words = words.unwrap_or(u64::from(project.config().generation.target_words));
            let brief = CreativeBrief::new(&idea, words, novel_type, style)?;
            let setup = project.create(&brief).await?;
            println!("《{}》", setup.outline.title);
            println!("主题: {}", setup.outline.theme);
            println!("{}", setup.outline.summary);
            println!();
            println!("人物 {} 个，计划 {} 章", setup.characters, setup.planned_chapters);
        }
        Command::GenerateRange { start, count } => {
            print_report(&project.generate_batch(start, count).await?);
        }
        Command::GeneratePending { limit } => {
            print_report(&project.generate_pending(limit).await?);
        }
        Command::Check { chapter, file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            print_chapter_check(&project.check_chapter(chapter, &content).await?);
        }
        Command::FullCheck => print_full_check(&project.full_check().await?),
        Command::Stats => {
            let stats = project.progress().await;
            println!("已生成章节: {}", stats.generated_chapters);
            println!("总字数: {} / {} ({:.1}%)", stats.total_words, stats.target_words, stats.completion);
            if let Some(latest) = stats.latest_chapter {
                println!("最新章节: 第{latest}章");
            }
            println!(
                "人物 {}，时间线事件 {}，地点 {}，情节线 {}，人物关系 {}",
                stats.characters, stats.timeline_events, stats.locations, stats.plot_threads, stats.relationships
            );
            let findings = project.store().read(|memory| memory.consistency_checklist()).await;
            if !findings.is_empty() {
                println!();
                println!("待检查:");
                for finding in findings {
                    println!("  - {finding}");
                }
            }
        }
        Command::Plan => {
            let plan = project.plan().await?;
            println!("已完成 {}/{} 章", plan.completed(), plan.len());
            for entry in plan.entries() {
                let mark = match entry.status {
                    PlanStatus::Completed => "✓",
                    PlanStatus::Pending => " ",
                };
                let preview = entry.summary_preview.as_deref().unwrap_or("");
                println!("[{mark}] 第{:>3}章 {:?} {preview}", entry.chapter, entry.act);
            }
        }
        Command::Search { query, limit } => {
            let hits = project.store().read(|memory| memory.search(&query, limit)).await;
            if hits.is_empty() {
                println!("没有找到 \"{query}\"");
            }
            for hit in hits {
                println!("[{:?} {}] {:.1} {}", hit.source, hit.key, hit.score, hit.snippet);
            }
        }
        Command::Export { path } => {
            project.store().export_to_file(&path).await?;
            println!("Exported to {}", path.display());
        }
        Command::Import { path } => {
            let report = project.store().import_from_file(&path).await?;
            if !report.is_complete() {
                warn!(failures = report.failures.len(), "import saved partially");
            }
            println!("Imported {}", path.display());
        }
        Command::Clear { confirmed } => {
            if !confirmed {
                return Err("refusing to clear without --yes".into());
            }
            project.store().clear().await?;
            println!("Memory cleared");
        }
        Command::VerifyKey => {}
    }
    Ok(())
}

async fn verify_key() -> Result<(), Box<dyn Error>> {
    let key = std::env::var(deepseek::API_KEY_ENV).unwrap_or_default();
    validate_api_key(&key)?;
    let client = deepseek::Client::new(key)?;
    if client.verify_key().await {
        println!("API key OK");
        Ok(())
    } else {
        Err("API key was rejected or the provider is unreachable".into())
    }
}

fn print_report(report: &BatchReport) {
    for outcome in &report.chapters {
        match outcome {
            ChapterOutcome::Succeeded(c) => {
                let score = c
                    .consistency
                    .as_ref()
                    .map(|check| format!("，一致性 {}", check.overall.score))
                    .unwrap_or_default();
                println!(
                    "✓ 第{}章 {} ({}字{score}，{:.1}s)",
                    c.chapter_number, c.title, c.word_count, c.generation_secs
                );
            }
            ChapterOutcome::Failed(c) => {
                println!("✗ 第{}章 失败: {}", c.chapter_number, c.error);
            }
        }
    }
    println!();
    println!(
        "完成 {}/{} 章，共 {} 字，用时 {:.1}s",
        report.success_count, report.total_chapters, report.total_words, report.total_time_secs
    );
}

fn print_chapter_check(check: &ChapterCheck) {
    let verdict = if check.overall.passed { "通过" } else { "未通过" };
    println!("一致性得分: {} ({verdict})", check.overall.score);
    for (name, result) in &check.details {
        println!("  {name}: {}", result.score);
    }
    for issue in &check.overall.issues {
        println!("  问题: {issue}");
    }
    for suggestion in &check.overall.suggestions {
        println!("  建议: {suggestion}");
    }
}

fn print_full_check(check: &FullCheck) {
    println!("总体一致性: {}", check.overall_score);
    for (label, component) in [
        ("人物", &check.character),
        ("情节", &check.plot),
        ("世界观", &check.worldview),
        ("时间线", &check.timeline),
    ] {
        println!("  {label}: {}", component.score);
        for issue in &component.issues {
            println!("    - {issue}");
        }
    }
}
