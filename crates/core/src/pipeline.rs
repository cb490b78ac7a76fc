use crate::answer::{
    build_answer_prompt, build_context, compose_extractive_answer, suggest_similar_queries,
    LOW_RELEVANCE_ANSWER, NO_RESULTS_ANSWER,
};
use crate::chunking::TextChunker;
use crate::scorer::{round_to, RetrievalScorer};
use crate::traits::{Encoder, TextGenerator, VectorIndex};
use crate::{
    ChatRequest, ChatResponse, HitMetadata, IndexedChunk, IngestError, IngestionReport,
    MetadataFilter, RagTrace, SearchError, SourceDocument, TracedHit,
};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Wires the chunker and scorer to an encoder, an index and an optional
/// answer generator. All collaborators are passed in; nothing is global.
pub struct RagPipeline<E, V, G>
where
    E: Encoder,
    V: VectorIndex,
    G: TextGenerator,
{
    chunker: TextChunker,
    scorer: RetrievalScorer,
    encoder: E,
    index: V,
    generator: Option<G>,
}

impl<E, V, G> RagPipeline<E, V, G>
where
    E: Encoder + Send + Sync,
    V: VectorIndex + Send + Sync,
    G: TextGenerator + Send + Sync,
{
    pub fn new(
        chunker: TextChunker,
        scorer: RetrievalScorer,
        encoder: E,
        index: V,
        generator: Option<G>,
    ) -> Self {
        Self {
            chunker,
            scorer,
            encoder,
            index,
            generator,
        }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub async fn ingest_document(
        &self,
        document: &SourceDocument,
    ) -> Result<IngestionReport, IngestError> {
        let chunks = self.chunker.split(&document.text);
        let category = document.category_or_default().to_string();

        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(position, text)| IndexedChunk {
                chunk_id: format!("{}_{position}", document.doc_id),
                text,
                metadata: HitMetadata {
                    category: category.clone(),
                    department: category.clone(),
                    source_doc_id: document.doc_id.clone(),
                },
            })
            .collect();

        if !indexed.is_empty() {
            let texts: Vec<String> = indexed.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.encoder.encode_batch(&texts);
            self.index.upsert(&indexed, &embeddings).await?;
        }

        info!(
            doc_id = %document.doc_id,
            title = %document.title,
            chunk_count = indexed.len(),
            "document ingested"
        );

        Ok(IngestionReport {
            doc_id: document.doc_id.clone(),
            chunk_count: indexed.len(),
            chunk_ids: indexed.into_iter().map(|chunk| chunk.chunk_id).collect(),
            ingested_at: Utc::now(),
        })
    }

    /// Raw nearest neighbours for inspection: no threshold, no generation.
    /// Similarities are rounded to four decimals.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<TracedHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let filter = filter.filter(|filter| !filter.is_empty());
        let query_vector = self.encoder.encode(query);
        let hits = self
            .index
            .search(&query_vector, top_k.max(1), filter)
            .await?;

        info!(query, hit_count = hits.len(), filtered = filter.is_some(), "raw search");

        Ok(hits
            .iter()
            .map(|hit| TracedHit {
                similarity: round_to(hit.similarity(), 4),
                ..TracedHit::from(hit)
            })
            .collect())
    }

    pub async fn ask(&self, request: &ChatRequest) -> Result<ChatResponse, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let top_k = request.max_results.max(1);
        let filter = request
            .department
            .as_ref()
            .map(|department| MetadataFilter::department(department.clone()));

        let query_vector = self.encoder.encode(&request.query);
        let raw_hits = self
            .index
            .search(&query_vector, top_k, filter.as_ref())
            .await?;

        let mut trace = RagTrace {
            embedding_dim: self.encoder.dimensions(),
            top_k,
            similarity_threshold: self.scorer.config().similarity_threshold,
            retrieved_docs: raw_hits.iter().map(TracedHit::from).collect(),
            final_prompt: String::new(),
        };

        if raw_hits.is_empty() {
            info!(query = %request.query, "no documents retrieved");
            return Ok(empty_response(NO_RESULTS_ANSWER, trace));
        }

        let scored = self.scorer.score(raw_hits);
        if scored.is_empty() {
            info!(query = %request.query, "no document passed the similarity threshold");
            return Ok(empty_response(LOW_RELEVANCE_ANSWER, trace));
        }

        let context_docs = scored.texts();
        let context = build_context(&context_docs, request.patient_profile.as_ref());
        trace.final_prompt = build_answer_prompt(&request.query, &context);

        let answer = self.compose_answer(&trace.final_prompt, &context_docs).await;
        let references = self.scorer.references(&scored);

        info!(
            query = %request.query,
            kept = scored.hits.len(),
            confidence = scored.confidence,
            "question answered"
        );

        Ok(ChatResponse {
            answer,
            references,
            confidence: scored.confidence,
            similar_queries: suggest_similar_queries(&request.query),
            trace: Some(trace),
        })
    }

    async fn compose_answer(&self, prompt: &str, context_docs: &[String]) -> String {
        let Some(generator) = &self.generator else {
            debug!("no generator configured, composing extractive answer");
            return compose_extractive_answer(context_docs);
        };

        match generator.generate(prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "answer generation failed, falling back to extractive answer");
                compose_extractive_answer(context_docs)
            }
        }
    }
}

fn empty_response(answer: &str, trace: RagTrace) -> ChatResponse {
    ChatResponse {
        answer: answer.to_string(),
        references: Vec::new(),
        confidence: 0.0,
        similar_queries: Vec::new(),
        trace: Some(trace),
    }
}
