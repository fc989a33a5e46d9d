use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docqa_cli::{DEFAULT_SOURCE, DataLayout, load_config};
use docqa_rag::{
    AnswerGenerator, Chunker, IndexBuilder, KnowledgeIndex, OpenAiCompletionService,
    OpenAiEmbeddingService, QueryOutcome, QueryPipeline, QueryRequest, RagConfig, SentenceChunker,
    read_corpus, write_corpus,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Question answering over a fixed document corpus")]
struct Cli {
    /// Data folder holding chunks/ and embeddings/
    #[arg(long, env = "BASE_FOLDER_PATH", default_value = ".")]
    data_dir: PathBuf,

    /// JSON file overriding pipeline parameters
    #[arg(long, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Embedding width to request from the model (defaults to the model's own)
    #[arg(long, env = "AZURE_OPENAI_EMBEDDING_DIMENSIONS", global = true)]
    embedding_dimensions: Option<NonZeroUsize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split text files into overlapping chunks and write the corpus file
    Chunk {
        /// Plain-text documents to chunk
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Corpus file to write (defaults to <data-dir>/chunks/chunks.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Embed the corpus and persist the vector index
    BuildIndex {
        /// Corpus file to read (defaults to <data-dir>/chunks/chunks.json)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Source attributed to corpus entries without one
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
    },
    /// Retrieve the context for a question without generating an answer
    Query {
        #[command(flatten)]
        query: QueryArgs,

        /// Print the outcome as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Retrieve context and generate a grounded answer
    Ask {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// The question
    question: String,

    /// Number of neighbours per search (defaults to the configured top_k)
    #[arg(short, long)]
    k: Option<usize>,

    /// Decompose the question and retrieve per sub-question
    #[arg(long, default_value_t = false)]
    multi_hop: bool,
}

impl QueryArgs {
    fn request(&self) -> QueryRequest {
        let request = if self.multi_hop {
            QueryRequest::multi_hop(self.question.as_str())
        } else {
            QueryRequest::new(self.question.as_str())
        };
        match self.k {
            Some(k) => request.with_k(k),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let layout = DataLayout::new(&cli.data_dir);

    match cli.command {
        Commands::Chunk { inputs, output } => chunk(&config, &layout, &inputs, output),
        Commands::BuildIndex { corpus, source } => {
            let embedder = embedding_service(cli.embedding_dimensions)?;
            build_index(&config, &layout, embedder, corpus, &source).await
        }
        Commands::Query { query, json } => {
            let pipeline = pipeline(config, &layout, cli.embedding_dimensions)?;
            let outcome = pipeline.query(&query.request()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
            Ok(())
        }
        Commands::Ask { query } => {
            let completion = Arc::new(OpenAiCompletionService::from_env()?);
            let pipeline = pipeline(config, &layout, cli.embedding_dimensions)?;
            let outcome = pipeline.query(&query.request()).await?;
            let answer = AnswerGenerator::new(completion).answer(&query.question, &outcome).await?;
            println!("{}", answer.text);
            if !answer.references.is_empty() {
                println!("\nReferences:");
                for reference in &answer.references {
                    print_reference(reference.id, &reference.title, &reference.url);
                }
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn chunk(
    config: &RagConfig,
    layout: &DataLayout,
    inputs: &[PathBuf],
    output: Option<PathBuf>,
) -> Result<()> {
    let chunker = SentenceChunker::new(config.chunk_max_tokens, config.chunk_overlap_sentences);
    let mut chunks = Vec::new();
    for input in inputs {
        let text = fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let produced = chunker.chunk(&text);
        info!(file = %input.display(), chunks = produced.len(), "chunked document");
        chunks.extend(produced);
    }
    if chunks.is_empty() {
        bail!("no chunks produced; the input documents are empty");
    }

    let output = match output {
        Some(path) => path,
        None => {
            layout.ensure_dirs()?;
            layout.chunks_file()
        }
    };
    write_corpus(&output, &chunks)?;
    println!("Wrote {} chunks to {}", chunks.len(), output.display());
    Ok(())
}

fn embedding_service(dimensions: Option<NonZeroUsize>) -> Result<OpenAiEmbeddingService> {
    let service = OpenAiEmbeddingService::from_env()?;
    Ok(match dimensions {
        Some(dims) => service.with_dimensions(dims.get()),
        None => service,
    })
}

async fn build_index(
    config: &RagConfig,
    layout: &DataLayout,
    embedder: OpenAiEmbeddingService,
    corpus: Option<PathBuf>,
    source: &str,
) -> Result<()> {
    let corpus = corpus.unwrap_or_else(|| layout.chunks_file());
    let chunks = read_corpus(&corpus, source)
        .with_context(|| format!("failed to read corpus {}", corpus.display()))?;

    let index = IndexBuilder::new(Arc::new(embedder)).batch_size(config.embed_batch_size).build(chunks).await?;

    layout.ensure_dirs()?;
    index.save(layout.vectors_file(), layout.metadata_file())?;
    println!(
        "Indexed {} chunks ({} dimensions) into {}",
        index.len(),
        index.vectors().dimensions(),
        layout.root().join("embeddings").display()
    );
    Ok(())
}

fn pipeline(
    config: RagConfig,
    layout: &DataLayout,
    dimensions: Option<NonZeroUsize>,
) -> Result<QueryPipeline> {
    let index = KnowledgeIndex::load(layout.vectors_file(), layout.metadata_file())
        .context("failed to load the index; run `docqa build-index` first")?;
    let pipeline = QueryPipeline::builder()
        .config(config)
        .embedding_service(Arc::new(embedding_service(dimensions)?))
        .completion_service(Arc::new(OpenAiCompletionService::from_env()?))
        .index(index)
        .build()?;
    Ok(pipeline)
}

fn print_outcome(outcome: &QueryOutcome) {
    match outcome {
        QueryOutcome::OutOfDomain { message } => println!("{message}"),
        QueryOutcome::Answerable { chunks, references } => {
            if chunks.is_empty() {
                println!("No relevant passages found.");
            }
            for (rank, chunk) in chunks.iter().enumerate() {
                println!("[{}] ({}) {}\n", rank + 1, chunk.source, chunk.text);
            }
            if !references.is_empty() {
                println!("References:");
                for reference in references {
                    print_reference(reference.id, &reference.title, &reference.url);
                }
            }
        }
    }
}

fn print_reference(id: usize, title: &str, url: &str) {
    if url.is_empty() {
        println!("  {id}. {title}");
    } else {
        println!("  {id}. {title} <{url}>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_dimensions_flag_is_global() {
        let cli = Cli::try_parse_from(["docqa", "build-index", "--embedding-dimensions", "3072"])
            .unwrap();
        assert_eq!(cli.embedding_dimensions.map(NonZeroUsize::get), Some(3072));
        assert!(matches!(cli.command, Commands::BuildIndex { .. }));
    }

    #[test]
    fn zero_embedding_dimensions_are_rejected() {
        assert!(Cli::try_parse_from(["docqa", "--embedding-dimensions", "0", "build-index"]).is_err());
    }
}
