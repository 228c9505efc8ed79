//! Folio command-line driver.
//!
//! Loads a saved document into a section manager, optionally edits it and
//! prints the result as JSON on stdout. Logs go to stderr.
//!
//! Usage:
//!   folio render doc.json
//!   folio outline doc.json
//!   folio convert doc.json --index 2 --tool header
//!   folio merge doc.json --target 0 --source 1 --config editor.ron

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use folio_core::{render_document, save_document, EditorConfig, SectionManager, ToolRegistry};
use folio_types::{OutputData, OutputSection};

/// Drive the Folio editor core from the command line.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Load, inspect and transform Folio documents")]
struct Args {
    /// Editor configuration (.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a document and print it as saved by the editor
    Render { file: PathBuf },

    /// Print a snapshot of every section
    Outline { file: PathBuf },

    /// Convert one section to another tool
    Convert {
        file: PathBuf,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        tool: String,
    },

    /// Merge the source section into the target section
    Merge {
        file: PathBuf,
        #[arg(long)]
        target: usize,
        #[arg(long)]
        source: usize,
    },
}

/// A saved document, or a bare list of sections.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Document(OutputData),
    Blocks(Vec<OutputSection>),
}

fn load_blocks(path: &Path) -> Result<Vec<OutputSection>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let document: DocumentFile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match document {
        DocumentFile::Document(data) => data.blocks,
        DocumentFile::Blocks(blocks) => blocks,
    })
}

fn build_manager(config: Option<&Path>) -> Result<SectionManager> {
    let mut registry = ToolRegistry::with_builtins();
    if let Some(path) = config {
        let config = EditorConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
        registry.configure(&config);
    }
    Ok(SectionManager::new(registry))
}

fn open(file: &Path, config: Option<&Path>) -> Result<SectionManager> {
    let mut manager = build_manager(config)?;
    let blocks = load_blocks(file)?;
    let count = render_document(&mut manager, blocks)?;
    tracing::info!(file = %file.display(), sections = count, "document loaded");
    Ok(manager)
}

async fn run(args: Args) -> Result<serde_json::Value> {
    let config = args.config.as_deref();
    let output = match args.command {
        Command::Render { file } => {
            let manager = open(&file, config)?;
            serde_json::to_value(save_document(&manager).await)?
        }
        Command::Outline { file } => {
            let manager = open(&file, config)?;
            let outline: Vec<_> = manager.sections().iter().map(|s| s.snapshot()).collect();
            serde_json::to_value(outline)?
        }
        Command::Convert { file, index, tool } => {
            let mut manager = open(&file, config)?;
            let section = manager
                .get_by_index(index)
                .with_context(|| format!("no section at index {index}"))?;
            manager.convert(&section, &tool, None).await?;
            serde_json::to_value(save_document(&manager).await)?
        }
        Command::Merge { file, target, source } => {
            let mut manager = open(&file, config)?;
            let target = manager
                .get_by_index(target)
                .with_context(|| format!("no section at index {target}"))?;
            let source = manager
                .get_by_index(source)
                .with_context(|| format!("no section at index {source}"))?;
            manager.merge_sections(&target, &source).await?;
            serde_json::to_value(save_document(&manager).await)?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let output = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn document(value: serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{value}").unwrap();
        file
    }

    fn args(command: Command) -> Args {
        Args { config: None, command }
    }

    #[tokio::test]
    async fn test_render_round_trip() {
        let file = document(json!({
            "time": 1,
            "version": "0",
            "blocks": [
                {"id": "p1", "type": "paragraph", "data": {"text": "Hello"}},
                {"id": "x1", "type": "mystery", "data": {"n": 1}}
            ]
        }));
        let output = run(args(Command::Render { file: file.path().into() })).await.unwrap();
        let blocks = output["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["data"]["text"], json!("Hello"));
        assert_eq!(blocks[1], json!({"id": "x1", "type": "mystery", "data": {"n": 1}}));
    }

    #[tokio::test]
    async fn test_merge_command() {
        let file = document(json!([
            {"type": "paragraph", "data": {"text": "Hello "}},
            {"type": "paragraph", "data": {"text": "World"}}
        ]));
        let command = Command::Merge {
            file: file.path().into(),
            target: 0,
            source: 1,
        };
        let output = run(args(command)).await.unwrap();
        let blocks = output["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["data"]["text"], json!("Hello World"));
    }

    #[tokio::test]
    async fn test_convert_command() {
        let file = document(json!([{"type": "paragraph", "data": {"text": "Title"}}]));
        let command = Command::Convert {
            file: file.path().into(),
            index: 0,
            tool: "header".into(),
        };
        let output = run(args(command)).await.unwrap();
        assert_eq!(output["blocks"][0]["type"], json!("header"));
        assert_eq!(output["blocks"][0]["data"]["text"], json!("Title"));
    }

    #[tokio::test]
    async fn test_config_file_is_applied() {
        let mut config = tempfile::Builder::new().suffix(".ron").tempfile().unwrap();
        write!(config, "(default_tool: \"header\")").unwrap();
        let file = document(json!([]));
        let output = run(Args {
            config: Some(config.path().into()),
            command: Command::Outline { file: file.path().into() },
        })
        .await
        .unwrap();
        assert_eq!(output[0]["name"], json!("header"));
    }
}
