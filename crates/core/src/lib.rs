pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod scorer;
pub mod stores;
pub mod traits;

pub use chunking::{ChunkingConfig, TextChunker};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{GenerationError, IngestError, SearchError};
pub use evaluation::{
    calculate_metrics, format_report, AiAudit, BatchEvaluation, CaseSummary, EvaluationCase,
    EvaluationResult, Evaluator, RetrievalMetrics,
};
pub use generator::{ChatCompletionsGenerator, GeneratorConfig};
pub use ingest::{discover_text_files, load_corpus, CorpusLoad, SkippedDocument};
pub use models::{
    ChatRequest, ChatResponse, HitMetadata, IndexedChunk, IngestionReport, MetadataFilter,
    PatientProfile, RagTrace, Reference, RetrievalHit, SourceDocument, TracedHit,
};
pub use patterns::TextPatterns;
pub use pipeline::RagPipeline;
pub use scorer::{confidence, RetrievalScorer, ScoredRetrieval, ScorerConfig};
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::{Encoder, TextGenerator, VectorIndex};
