use crate::{GenerationError, IndexedChunk, MetadataFilter, RetrievalHit, SearchError};
use async_trait::async_trait;

/// Text to vector encoder. Implementations must return unit-L2-normalized
/// vectors so that cosine similarity reduces to a dot product.
pub trait Encoder {
    fn dimensions(&self) -> usize;

    fn encode(&self, text: &str) -> Vec<f32>;

    fn encode_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

#[async_trait]
pub trait VectorIndex {
    async fn upsert(
        &self,
        chunks: &[IndexedChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    /// Nearest neighbours ordered by ascending distance.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, SearchError>;
}

#[async_trait]
pub trait TextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
