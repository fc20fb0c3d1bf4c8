use std::path::{Path, PathBuf};
use std::time::Duration;
use std::env;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docchat_core::config::Config;
use docchat_core::types::{ChunkStrategy, Meta};
use docchat_pipeline::{AnswerStatus, Collaborators, MessageInput};

const USAGE: &str = "Usage:
  docchat ingest <document-id> <file> [--strategy sentence|paragraph|semantic|hybrid] [--pages N]
  docchat ingest-dir <dir> [--strategy ...]
  docchat ask <document-id> <question...> [--chat <chat-id>]
  docchat delete <document-id>";

struct Args {
    command: String,
    positional: Vec<String>,
    strategy: Option<ChunkStrategy>,
    pages: Option<u64>,
    chat: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut raw = env::args().skip(1);
    let Some(command) = raw.next() else { bail!("{}", USAGE) };
    let raw: Vec<String> = raw.collect();
    let mut args = Args { command, positional: Vec::new(), strategy: None, pages: None, chat: None };
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--strategy" | "-s" => {
                let value = raw.get(i + 1).context("--strategy requires a value")?;
                args.strategy = Some(value.parse()?);
                i += 1;
            }
            "--pages" => {
                let value = raw.get(i + 1).context("--pages requires a number")?;
                args.pages = Some(value.parse().with_context(|| format!("--pages: '{}' is not a number", value))?);
                i += 1;
            }
            "--chat" => {
                args.chat = Some(raw.get(i + 1).context("--chat requires an id")?.clone());
                i += 1;
            }
            other if other.starts_with('-') => bail!("unknown flag '{}'\n{}", other, USAGE),
            other => args.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(args)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn page_meta(pages: Option<u64>) -> Meta {
    let mut meta = Meta::new();
    if let Some(n) = pages { meta.insert("page_count".into(), serde_json::Value::from(n)); }
    meta
}

fn text_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "txt" || x == "md"))
        .map(|e| e.into_path())
        .collect()
}

async fn run(args: Args, collaborators: &Collaborators) -> anyhow::Result<()> {
    match (args.command.as_str(), args.positional.as_slice()) {
        ("ingest", [document_id, file]) => {
            let text = tokio::fs::read_to_string(file).await.with_context(|| format!("reading {}", file))?;
            let pb = spinner(format!("Ingesting {}", document_id));
            let report = collaborators.ingestor().ingest(document_id, &text, args.strategy, page_meta(args.pages)).await;
            pb.finish_and_clear();
            let report = report?;
            println!("✅ Ingested {} ({} chunks, {} stale removed)", report.document_id, report.chunks, report.removed_stale);
        }
        ("ingest-dir", [dir]) => {
            let files = text_files(Path::new(dir));
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
            let ingestor = collaborators.ingestor();
            let (mut done, mut chunks) = (0usize, 0usize);
            for path in &files {
                let Some(document_id) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                pb.set_message(document_id.to_string());
                let text = tokio::fs::read_to_string(path).await.with_context(|| format!("reading {}", path.display()))?;
                match ingestor.ingest(document_id, &text, args.strategy, Meta::new()).await {
                    Ok(report) => {
                        done += 1;
                        chunks += report.chunks;
                    }
                    Err(e) => pb.println(format!("⚠️  {}: {:#}", path.display(), e)),
                }
                pb.inc(1);
            }
            pb.finish_and_clear();
            println!("✅ Ingested {} of {} files ({} chunks)", done, files.len(), chunks);
        }
        ("ask", [document_id, question @ ..]) if !question.is_empty() => {
            let chat = collaborators.chat_pipeline();
            let chat_id = args.chat.clone().unwrap_or_else(|| document_id.clone());
            chat.start_chat(&chat_id, document_id).await?;
            let pb = spinner("Thinking".to_string());
            let answer = chat.answer(&chat_id, &MessageInput::Text(question.join(" "))).await;
            pb.finish_and_clear();
            let answer = answer?;
            println!("{}", answer.content);
            if !answer.citations.is_empty() {
                let pages: Vec<String> = answer.citations.iter().map(|c| format!("p{}#{}", c.page_number, c.chunk_index)).collect();
                println!("\n📄 Sources: {}", pages.join(", "));
            }
            for link in &answer.cross_modal_links {
                println!("🔗 {}", link.description);
            }
            match (answer.status, &answer.engine_used) {
                (AnswerStatus::ContentUnavailable, _) | (_, None) => {}
                (_, Some(engine)) => println!("\n({} · {} tokens)", engine, answer.tokens_used),
            }
        }
        ("delete", [document_id]) => {
            collaborators.ingestor().delete_document(document_id).await?;
            println!("🗑️  Deleted {}", document_id);
        }
        _ => bail!("{}", USAGE),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let args = parse_args()?;
    let base = env::current_dir()?;

    tokio::runtime::Runtime::new()?.block_on(async {
        let collaborators = Collaborators::init(settings, &base).await?;
        let outcome = run(args, &collaborators).await;
        collaborators.close();
        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::config::Settings;
    use docchat_core::traits::DocumentStore;

    async fn collaborators(dir: &Path) -> Collaborators {
        let mut settings = Settings::default();
        settings.embedding.provider = "hash".into();
        settings.embedding.dim = 32;
        settings.vector.backend = "memory".into();
        settings.store.path = dir.join("store").display().to_string();
        settings.generation.primary.api_key_env = None;
        settings.generation.secondary.api_key_env = None;
        Collaborators::init(settings, dir).await.unwrap()
    }

    fn args(command: &str, positional: &[&str]) -> Args {
        Args { command: command.into(), positional: positional.iter().map(|s| s.to_string()).collect(), strategy: None, pages: None, chat: None }
    }

    #[tokio::test]
    async fn ingest_commands_read_files_on_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        tokio::fs::create_dir_all(&docs).await.unwrap();
        tokio::fs::write(docs.join("pump.txt"), "The pump must stay below six bar. Check it weekly.").await.unwrap();
        tokio::fs::write(docs.join("battery.md"), "Battery cells charge overnight.").await.unwrap();
        let c = collaborators(dir.path()).await;

        let file = docs.join("pump.txt").display().to_string();
        run(args("ingest", &["manual", &file]), &c).await.unwrap();
        run(args("ingest-dir", &[&docs.display().to_string()]), &c).await.unwrap();
        for id in ["manual", "pump", "battery"] {
            assert!(c.documents.document(id).await.unwrap().is_some(), "{}", id);
        }

        let missing = docs.join("absent.txt").display().to_string();
        let err = run(args("ingest", &["x", &missing]), &c).await.unwrap_err();
        assert!(err.to_string().starts_with("reading "));
    }
}
