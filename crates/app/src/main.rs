use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    discover_pdf_files, discover_pdf_files_flat, BatchCoordinator, CharacterNgramEmbedder,
    Embedder, FilterPolicy, GenerationParams, HttpEmbedder, HttpLanguageModel, IndexCollection,
    IndexingPipeline, LanguageModel, LopdfExtractor, ModelEndpoint, PdfExtractor, PipelineOptions,
    QueryResponder, RecursiveSplitter, SplitterConfig, DEFAULT_BATCH_SIZE,
    DEFAULT_CREDENTIALS_PROFILE, DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL,
    DEFAULT_ROOT_DIRECTORY, DEFAULT_TOP_K,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the PDFs
    #[arg(long, global = true, env = "RAG_ROOT", default_value = DEFAULT_ROOT_DIRECTORY)]
    root: PathBuf,

    /// Embedding endpoint; the local trigram embedder is used when unset
    #[arg(long, global = true, env = "RAG_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model identifier
    #[arg(long, global = true, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Language model endpoint
    #[arg(long, global = true, env = "RAG_LLM_URL")]
    llm_url: Option<String>,

    /// Language model identifier
    #[arg(long, global = true, default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Credentials profile forwarded to the model endpoints
    #[arg(
        long,
        global = true,
        env = "RAG_CREDENTIALS_PROFILE",
        default_value = DEFAULT_CREDENTIALS_PROFILE
    )]
    credentials_profile: String,

    /// Bearer token for the model endpoints
    #[arg(long, global = true, env = "RAG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum chunk length in characters
    #[arg(long, global = true, default_value = "300")]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, global = true, default_value = "10")]
    chunk_overlap: usize,

    #[arg(long, global = true, default_value = "3000")]
    max_tokens: u32,

    #[arg(long, global = true, default_value = "0.1")]
    temperature: f32,

    #[arg(long, global = true, default_value = "0.5")]
    top_p: f32,
}

#[derive(Subcommand)]
enum Command {
    /// Extract every PDF under the root in parallel batches.
    Load {
        #[command(flatten)]
        batching: Batching,
    },
    /// Build one vector index per PDF in the root.
    Index {
        #[command(flatten)]
        selection: Selection,
    },
    /// Index the root, then ask every index the same question.
    Ask {
        /// Question to answer
        #[arg(long)]
        question: String,
        /// Chunks retrieved per index.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Load the whole tree in parallel batches first, then index each loaded file.
        #[arg(long, default_value_t = false)]
        bulk: bool,
        #[command(flatten)]
        batching: Batching,
        #[command(flatten)]
        selection: Selection,
    },
}

#[derive(clap::Args)]
struct Batching {
    /// Files per worker task.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Concurrent worker tasks; defaults to the available parallelism.
    #[arg(long)]
    workers: Option<usize>,
}

impl Batching {
    fn options(&self) -> PipelineOptions {
        let mut options = PipelineOptions {
            batch_size: self.batch_size,
            ..PipelineOptions::default()
        };
        if let Some(workers) = self.workers {
            options.max_workers = workers;
        }
        options
    }
}

#[derive(clap::Args)]
struct Selection {
    /// Walk subdirectories instead of listing the root only.
    #[arg(long, default_value_t = false)]
    recursive: bool,
    /// Skip non-PDF inputs instead of aborting.
    #[arg(long, default_value_t = false)]
    permissive: bool,
}

impl Selection {
    fn policy(&self) -> FilterPolicy {
        if self.permissive {
            FilterPolicy::Permissive
        } else {
            FilterPolicy::Strict
        }
    }

    fn discover(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let files = if self.recursive {
            discover_pdf_files(root)?
        } else {
            discover_pdf_files_flat(root)?
        };
        Ok(files)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        root = %cli.root.display(),
        "pdf-rag boot"
    );

    let extractor: Arc<dyn PdfExtractor> = Arc::new(LopdfExtractor::from_env());

    match &cli.command {
        Command::Load { batching } => {
            let files = discover_pdf_files(&cli.root)?;
            println!("Found {} PDF files to process", files.len());

            let report = BatchCoordinator::new(extractor, batching.options())
                .load(&files)
                .await?;
            let counters = report.counters;
            if counters.files_skipped > 0 {
                warn!(skipped = counters.files_skipped, "non-PDF files were skipped");
            }

            println!(
                "Processed {} / {} files ({} skipped)",
                counters.files_processed, counters.files_found, counters.files_skipped
            );
            println!("Total documents loaded: {}", counters.documents_loaded);
        }
        Command::Index { selection } => {
            let files = selection.discover(&cli.root)?;
            println!("Found {} PDF files to process", files.len());

            let embedder = build_embedder(&cli)?;
            let indexes = build_indexes(&cli, extractor, embedder, selection, &files).await?;
            println!("Total documents indexed: {}", indexes.len());
        }
        Command::Ask {
            question,
            top_k,
            bulk,
            batching,
            selection,
        } => {
            let llm = language_model(&cli)?;
            let embedder = build_embedder(&cli)?;

            let indexes = if *bulk {
                let files = discover_pdf_files(&cli.root)?;
                println!("Found {} PDF files to process", files.len());

                let coordinator = BatchCoordinator::new(Arc::clone(&extractor), batching.options());
                let report = coordinator.load(&files).await?;
                println!("Total documents loaded: {}", report.counters.documents_loaded);

                pipeline(&cli, extractor, Arc::clone(&embedder), selection)?
                    .index_loaded(&report.documents)
                    .await
            } else {
                let files = selection.discover(&cli.root)?;
                println!("Found {} PDF files to process", files.len());

                build_indexes(&cli, extractor, Arc::clone(&embedder), selection, &files).await?
            };
            println!("Total documents indexed: {}", indexes.len());

            let responder = QueryResponder::new(embedder, llm).with_top_k(*top_k);
            let responses = responder.respond(&indexes, question).await;

            println!("Responses to '{question}':");
            for (position, response) in responses.iter().enumerate() {
                println!("[{}] {}", position + 1, response);
            }
            if responses.len() < indexes.len() {
                println!(
                    "{} of {} indexes could not be queried",
                    indexes.len() - responses.len(),
                    indexes.len()
                );
            }
        }
    }

    Ok(())
}

async fn build_indexes(
    cli: &Cli,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    selection: &Selection,
    files: &[PathBuf],
) -> anyhow::Result<IndexCollection> {
    Ok(pipeline(cli, extractor, embedder, selection)?
        .index_files(files)
        .await?)
}

fn pipeline(
    cli: &Cli,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    selection: &Selection,
) -> anyhow::Result<IndexingPipeline> {
    let splitter = RecursiveSplitter::new(splitter_config(cli))?;
    Ok(IndexingPipeline::new(extractor, embedder, splitter).with_policy(selection.policy()))
}

fn splitter_config(cli: &Cli) -> SplitterConfig {
    SplitterConfig {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        ..SplitterConfig::default()
    }
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    match &cli.embedding_url {
        Some(url) => {
            let endpoint = ModelEndpoint::parse(url, cli.embedding_model.clone())?
                .with_credentials(cli.credentials_profile.clone(), cli.api_key.clone());
            Ok(Arc::new(HttpEmbedder::new(endpoint)))
        }
        None => {
            info!("no embedding endpoint configured, using the local trigram embedder");
            Ok(Arc::new(CharacterNgramEmbedder::default()))
        }
    }
}

fn language_model(cli: &Cli) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let Some(url) = &cli.llm_url else {
        anyhow::bail!("a language model endpoint is required: pass --llm-url or set RAG_LLM_URL");
    };

    let endpoint = ModelEndpoint::parse(url, cli.llm_model.clone())?
        .with_credentials(cli.credentials_profile.clone(), cli.api_key.clone());
    let params = GenerationParams {
        max_tokens: cli.max_tokens,
        temperature: cli.temperature,
        top_p: cli.top_p,
    };

    Ok(Arc::new(HttpLanguageModel::new(endpoint, params)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_ask_accepts_batching_flags() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "pdf-rag",
            "ask",
            "--question",
            "How many leave days?",
            "--bulk",
            "--batch-size",
            "7",
            "--workers",
            "3",
        ])?;

        let Command::Ask { bulk, batching, .. } = cli.command else {
            panic!("expected the ask command");
        };
        let options = batching.options();
        assert!(bulk);
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.max_workers, 3);
        Ok(())
    }

    #[test]
    fn load_defaults_to_standard_batch_size() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["pdf-rag", "load"])?;

        let Command::Load { batching } = cli.command else {
            panic!("expected the load command");
        };
        assert_eq!(batching.options().batch_size, DEFAULT_BATCH_SIZE);
        Ok(())
    }
}
