use async_trait::async_trait;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use medrag_core::{
    format_report, load_corpus, BatchEvaluation, CharacterNgramEmbedder, ChatCompletionsGenerator,
    ChatRequest, ChunkingConfig, Encoder, EvaluationCase, Evaluator, GeneratorConfig,
    InMemoryVectorIndex, IndexedChunk, MetadataFilter, QdrantStore, RagPipeline, RetrievalHit,
    RetrievalScorer, ScorerConfig, SearchError, TextChunker, TextGenerator, VectorIndex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "medrag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL. Without it an in-memory index is used.
    #[arg(long, env = "MEDRAG_QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, env = "MEDRAG_QDRANT_COLLECTION", default_value = "medical_chunks")]
    qdrant_collection: String,

    /// Base URL of an OpenAI-compatible chat completions server.
    #[arg(long, env = "MEDRAG_LLM_URL")]
    llm_url: Option<String>,

    #[arg(long, env = "MEDRAG_LLM_MODEL", default_value = "qwen2.5-7b-instruct")]
    llm_model: String,

    #[arg(long, env = "MEDRAG_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Dimension of the hashed character n-gram embeddings.
    #[arg(long, env = "MEDRAG_EMBEDDING_DIM", default_value = "128")]
    embedding_dim: usize,

    #[command(flatten)]
    chunking: ChunkingArgs,

    #[command(flatten)]
    scoring: ScoringArgs,
}

#[derive(Args)]
struct ChunkingArgs {
    /// Maximum characters per chunk before overlap.
    #[arg(long, env = "MEDRAG_CHUNK_SIZE", default_value = "500")]
    chunk_size: usize,

    #[arg(long, env = "MEDRAG_CHUNK_OVERLAP", default_value = "50")]
    chunk_overlap: usize,

    /// Paragraphs shorter than this are merged with their neighbours.
    #[arg(long, env = "MEDRAG_MIN_MERGE_LENGTH", default_value = "50")]
    min_merge_length: usize,

    /// Chunks at or below this length are dropped.
    #[arg(long, env = "MEDRAG_MIN_CHUNK_LENGTH", default_value = "20")]
    min_chunk_length: usize,
}

impl From<&ChunkingArgs> for ChunkingConfig {
    fn from(args: &ChunkingArgs) -> Self {
        Self {
            chunk_size: args.chunk_size,
            chunk_overlap: args.chunk_overlap,
            min_merge_length: args.min_merge_length,
            min_chunk_length: args.min_chunk_length,
        }
    }
}

#[derive(Args)]
struct ScoringArgs {
    /// Hits with `1 - distance` below this are discarded.
    #[arg(long, env = "MEDRAG_SIMILARITY_THRESHOLD", default_value = "0.2")]
    similarity_threshold: f64,

    /// Upper bound on cited references.
    #[arg(long, env = "MEDRAG_MAX_REFERENCES", default_value = "5")]
    max_references: usize,
}

impl From<&ScoringArgs> for ScorerConfig {
    fn from(args: &ScoringArgs) -> Self {
        Self {
            similarity_threshold: args.similarity_threshold,
            max_results: args.max_references,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Split one document into chunks and print them.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        /// Print chunks as a JSON array.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load a corpus folder and index every document.
    Ingest {
        /// Folder that contains .txt/.md documents recursively.
        #[arg(long)]
        corpus: PathBuf,
    },
    /// Answer a question from the indexed corpus.
    Ask {
        #[arg(long)]
        query: String,
        /// Corpus to ingest first. Required with the in-memory index.
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = "5")]
        max_results: usize,
        /// Print the retrieval trace.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Raw nearest neighbours without threshold or generation.
    Search {
        #[arg(long)]
        query: String,
        /// Corpus to ingest first. Required with the in-memory index.
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        category: Option<String>,
        /// Restrict hits to chunks of one source document.
        #[arg(long)]
        doc_id: Option<String>,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Print the hits as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Grade recorded retrieval results against ground truth.
    Evaluate {
        /// JSON array of {query, retrieved_docs, ground_truth_docs}.
        #[arg(long)]
        cases: PathBuf,
        /// Ask the configured generator for a relevance audit.
        #[arg(long, default_value_t = false)]
        ai: bool,
        /// Print a formatted report per case after the summary.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
}

/// Index selected at startup from the command line.
enum IndexBackend {
    Memory(InMemoryVectorIndex),
    Qdrant(QdrantStore),
}

impl IndexBackend {
    async fn connect(cli: &Cli) -> anyhow::Result<Self> {
        match &cli.qdrant_url {
            Some(url) => {
                let store = QdrantStore::new(url, &cli.qdrant_collection, cli.embedding_dim);
                store.ensure_collection().await?;
                Ok(Self::Qdrant(store))
            }
            None => Ok(Self::Memory(InMemoryVectorIndex::with_dimensions(
                cli.embedding_dim,
            ))),
        }
    }

    fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

#[async_trait]
impl VectorIndex for IndexBackend {
    async fn upsert(
        &self,
        chunks: &[IndexedChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        match self {
            Self::Memory(index) => index.upsert(chunks, embeddings).await,
            Self::Qdrant(store) => store.upsert(chunks, embeddings).await,
        }
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, SearchError> {
        match self {
            Self::Memory(index) => index.search(query_vector, k, filter).await,
            Self::Qdrant(store) => store.search(query_vector, k, filter).await,
        }
    }
}

fn build_generator(cli: &Cli) -> anyhow::Result<Option<ChatCompletionsGenerator>> {
    let Some(endpoint) = &cli.llm_url else {
        return Ok(None);
    };
    let generator = ChatCompletionsGenerator::new(GeneratorConfig {
        endpoint: endpoint.clone(),
        model: cli.llm_model.clone(),
        api_key: cli.llm_api_key.clone(),
        ..GeneratorConfig::default()
    })?;
    Ok(Some(generator))
}

type Pipeline = RagPipeline<CharacterNgramEmbedder, IndexBackend, ChatCompletionsGenerator>;

async fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let chunker = TextChunker::new(ChunkingConfig::from(&cli.chunking))?;
    let scorer = RetrievalScorer::new(ScorerConfig::from(&cli.scoring))?;
    let encoder = CharacterNgramEmbedder::new(cli.embedding_dim);
    let index = IndexBackend::connect(cli).await?;
    let generator = build_generator(cli)?;

    info!(
        backend = if index.is_ephemeral() { "memory" } else { "qdrant" },
        generator = generator.as_ref().map(|g| g.model()).unwrap_or("extractive"),
        embedding_dim = encoder.dimensions(),
        "pipeline ready"
    );
    Ok(RagPipeline::new(chunker, scorer, encoder, index, generator))
}

async fn ingest_corpus(pipeline: &Pipeline, corpus: &Path) -> anyhow::Result<usize> {
    let load = load_corpus(corpus)?;
    for skipped in &load.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
    }

    let mut total_chunks = 0;
    for document in &load.documents {
        let report = pipeline.ingest_document(document).await?;
        total_chunks += report.chunk_count;
    }

    info!(
        corpus = %corpus.display(),
        documents = load.documents.len(),
        skipped = load.skipped_files.len(),
        chunk_count = total_chunks,
        "corpus ingested"
    );
    Ok(total_chunks)
}

/// Loads `corpus` when given. The in-memory index starts empty, so it
/// cannot answer anything without one.
async fn prepare_index(pipeline: &Pipeline, corpus: Option<&Path>) -> anyhow::Result<()> {
    match corpus {
        Some(corpus) => {
            ingest_corpus(pipeline, corpus).await?;
        }
        None if pipeline.index().is_ephemeral() => {
            anyhow::bail!("--corpus is required when no --qdrant-url is configured");
        }
        None => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "medrag boot"
    );

    match &cli.command {
        Command::Chunk { file, json } => {
            let text = tokio::fs::read_to_string(file).await?;
            let chunker = TextChunker::new(ChunkingConfig::from(&cli.chunking))?;
            let chunks = chunker.split(&text);

            if *json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                for (index, chunk) in chunks.iter().enumerate() {
                    println!("[chunk {index}] chars={}", chunk.chars().count());
                    println!("{chunk}\n");
                }
            }
        }
        Command::Ingest { corpus } => {
            let pipeline = build_pipeline(&cli).await?;
            if pipeline.index().is_ephemeral() {
                warn!("no --qdrant-url given, chunks are indexed in memory and discarded on exit");
            }
            let chunk_count = ingest_corpus(&pipeline, corpus).await?;
            println!(
                "{chunk_count} chunks ingested at {}",
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            corpus,
            category,
            doc_id,
            top_k,
            json,
        } => {
            let pipeline = build_pipeline(&cli).await?;
            prepare_index(&pipeline, corpus.as_deref()).await?;

            let filter = MetadataFilter {
                category: category.clone(),
                source_doc_id: doc_id.clone(),
                ..MetadataFilter::default()
            };
            let hits = pipeline.search(query, *top_k, Some(&filter)).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                println!("query: {query}");
                for hit in &hits {
                    println!(
                        "[{}] similarity={:.4} distance={:.4} category={} department={}",
                        hit.id, hit.similarity, hit.distance, hit.category, hit.department
                    );
                    println!("  {}", hit.content);
                }
            }
        }
        Command::Ask {
            query,
            corpus,
            department,
            max_results,
            explain,
        } => {
            let pipeline = build_pipeline(&cli).await?;
            prepare_index(&pipeline, corpus.as_deref()).await?;

            let request = ChatRequest {
                department: department.clone(),
                max_results: *max_results,
                ..ChatRequest::new(query.clone())
            };
            let response = pipeline.ask(&request).await?;

            println!("{}\n", response.answer);
            println!("confidence: {:.2}", response.confidence);
            for reference in &response.references {
                println!(
                    "reference: {} department={} category={}",
                    reference.title, reference.department, reference.category
                );
            }
            for suggestion in &response.similar_queries {
                println!("related: {suggestion}");
            }

            if *explain {
                if let Some(trace) = &response.trace {
                    println!(
                        "explain: embedding_dim={} top_k={} similarity_threshold={:.2}",
                        trace.embedding_dim, trace.top_k, trace.similarity_threshold
                    );
                    for hit in &trace.retrieved_docs {
                        println!(
                            "explain: id={} distance={:.4} similarity={:.4} department={}",
                            hit.id, hit.distance, hit.similarity, hit.department
                        );
                    }
                    println!("explain: prompt\n{}", trace.final_prompt);
                }
            }
        }
        Command::Evaluate { cases, ai, report } => {
            let raw = tokio::fs::read_to_string(cases).await?;
            let cases: Vec<EvaluationCase> = serde_json::from_str(&raw)?;

            let evaluator = match build_generator(&cli)? {
                Some(generator) => {
                    let generator: Arc<dyn TextGenerator + Send + Sync> = Arc::new(generator);
                    Evaluator::with_generator(generator)
                }
                None => {
                    if *ai {
                        warn!("--ai requested without --llm-url, AI audit is skipped");
                    }
                    Evaluator::new()
                }
            };

            if *report {
                let results = evaluator.evaluate_cases(&cases, *ai).await;
                let batch = BatchEvaluation::summarize(&results);
                println!("{}", serde_json::to_string_pretty(&batch)?);
                for result in &results {
                    println!("{}", format_report(result));
                }
            } else {
                let batch = evaluator.batch_evaluate(&cases, *ai).await;
                println!("{}", serde_json::to_string_pretty(&batch)?);
            }
        }
    }

    Ok(())
}
