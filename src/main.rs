use anyhow::Context;
use clap::{Parser, Subcommand};
use emr_recall::config::Config;
use emr_recall::logging;
use emr_recall::notes::{InMemoryNoteStore, NoteRecord};
use emr_recall::service::RecallService;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "emr-recall", about = "Retrieval and summarization over clinical notes")]
struct Cli {
    /// Path to a JSON file holding an array of note records.
    #[arg(long, global = true, default_value = "notes.json")]
    notes: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the vector index from the note file.
    Build,
    /// Retrieve matching note chunks for a patient.
    Query {
        /// Patient to scope retrieval to.
        #[arg(long)]
        patient: i64,
        /// Free-text query.
        #[arg(long)]
        q: String,
        /// Number of hits to return.
        #[arg(long)]
        k: Option<usize>,
    },
    /// Summarize a patient record, or answer a question about it.
    Summarize {
        /// Patient to summarize.
        #[arg(long)]
        patient: i64,
        /// Optional question; omitting it produces a whole-record summary.
        #[arg(long)]
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    logging::init_tracing();

    let notes = read_notes(&cli.notes)?;
    let service = RecallService::new(&config, Arc::new(InMemoryNoteStore::new(notes)));

    match cli.command {
        Command::Build => {
            let summary = service.build_index().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Query { patient, q, k } => {
            let hits = service
                .retrieve(patient, &q, k.unwrap_or(config.search_top_k))
                .await?;
            if hits.is_empty() {
                println!("No matching chunks for patient {patient}");
            }
            for hit in hits {
                println!(
                    "score={:.4} note_id={} date={} chunk={}",
                    hit.score, hit.chunk.note_id, hit.chunk.note_date, hit.chunk.chunk_index
                );
                println!("  {}", hit.chunk.text);
            }
        }
        Command::Summarize { patient, question } => {
            let outcome = service
                .summarize_or_answer(patient, question.as_deref())
                .await?;
            tracing::info!(
                provider = %outcome.provider,
                from_cache = outcome.from_cache,
                "Generation complete"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.contract)?);
        }
    }
    Ok(())
}

fn read_notes(path: &PathBuf) -> anyhow::Result<Vec<NoteRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read notes file {}", path.display()))?;
    let notes: Vec<NoteRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse notes file {}", path.display()))?;
    Ok(notes)
}
