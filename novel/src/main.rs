//! Command-line front end for co-writing a novel with a language model.
//!
//! ```bash
//! novel init --idea "一个山村少年意外获得上古传承……" --words 100000 --type 仙侠 --style 严肃正剧
//! novel generate --pending 5
//! novel check --full
//! ```
//!
//! Set `RUST_LOG=debug` for detailed logs; they go to stderr.

mod commands;

use commands::Command;
use novel_core::config::CONFIG_FILE;
use novel_core::NovelConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let (config_path, args) = split_config_flag(args)?;
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Run `novel --help` for usage.");
            std::process::exit(2);
        }
    };

    let config = NovelConfig::load(&config_path)?;
    commands::run(command, config).await
}

/// Pull `--config <path>` out of the arguments.
fn split_config_flag(args: Vec<String>) -> Result<(PathBuf, Vec<String>), String> {
    let mut config = PathBuf::from(CONFIG_FILE);
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "--config needs a path".to_string())?;
        } else {
            rest.push(arg);
        }
    }
    Ok((config, rest))
}

fn print_help() {
    println!("novel - long-form fiction with a consistent memory");
    println!();
    println!("USAGE:");
    println!("  novel [--config <PATH>] <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  init --idea <TEXT> [--words <N>] [--type <TYPE>] [--style <STYLE>]");
    println!("                         Generate outline, characters and world view");
    println!("  generate --start <N> --count <N>");
    println!("  generate --pending <N> Write chapters (pending ones from the plan by default)");
    println!("  check <CHAPTER> <FILE> Check a chapter text against the memory");
    println!("  check --full           Aggregate consistency check over the book");
    println!("  stats                  Progress and memory diagnostics");
    println!("  plan                   Show the chapter plan");
    println!("  search <QUERY> [--limit <N>]");
    println!("  export <PATH>          Export the memory as JSON");
    println!("  import <PATH>          Replace the memory with an export");
    println!("  clear --yes            Delete the memory, backups included");
    println!("  verify-key             Check DEEPSEEK_API_KEY with the provider");
    println!();
    println!("OPTIONS:");
    println!("  --config <PATH>        Config file (default: {CONFIG_FILE})");
    println!("  -h, --help             Show this help message");
    println!();
    println!("TYPES:");
    println!("  玄幻 仙侠 都市 科幻 悬疑 言情 历史 军事 武侠 其他");
    println!();
    println!("STYLES:");
    println!("  轻松幽默 严肃正剧 文艺细腻 快节奏 慢热细腻 群像描写");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_config_flag() {
        let (path, rest) = split_config_flag(args(&["--config", "my.toml", "stats"])).unwrap();
        assert_eq!(path, PathBuf::from("my.toml"));
        assert_eq!(rest, args(&["stats"]));

        let (path, _) = split_config_flag(args(&["plan"])).unwrap();
        assert_eq!(path, PathBuf::from(CONFIG_FILE));

        assert!(split_config_flag(args(&["stats", "--config"])).is_err());
    }
}
