use crate::embeddings::dot;
use crate::traits::VectorIndex;
use crate::{IndexedChunk, MetadataFilter, RetrievalHit, SearchError};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredPoint {
    chunk: IndexedChunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index held in memory.
///
/// Vectors are assumed unit-normalized, so distance is `1 - dot`.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    dimensions: Option<usize>,
    points: RwLock<Vec<StoredPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
            points: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), SearchError> {
        match self.dimensions {
            Some(expected) if expected != vector.len() => Err(SearchError::Request(format!(
                "vector dimension {} != {}",
                vector.len(),
                expected
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        chunks: &[IndexedChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        if chunks.len() != embeddings.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }
        for embedding in embeddings {
            self.check_dimensions(embedding)?;
        }

        let mut points = self.points.write().await;
        for (chunk, vector) in chunks.iter().zip(embeddings) {
            let point = StoredPoint {
                chunk: chunk.clone(),
                vector: vector.clone(),
            };
            match points
                .iter_mut()
                .find(|existing| existing.chunk.chunk_id == chunk.chunk_id)
            {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>, SearchError> {
        self.check_dimensions(query_vector)?;

        let points = self.points.read().await;
        let mut hits: Vec<RetrievalHit> = points
            .iter()
            .filter(|point| filter.map_or(true, |filter| filter.matches(&point.chunk.metadata)))
            .map(|point| RetrievalHit {
                id: point.chunk.chunk_id.clone(),
                text: point.chunk.text.clone(),
                metadata: point.chunk.metadata.clone(),
                distance: (1.0 - f64::from(dot(query_vector, &point.vector))).max(0.0),
            })
            .collect();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HitMetadata;

    fn chunk(id: &str, department: &str) -> IndexedChunk {
        IndexedChunk {
            chunk_id: id.to_string(),
            text: format!("text {id}"),
            metadata: HitMetadata {
                category: "通用".to_string(),
                department: department.to_string(),
                source_doc_id: id.split('_').next().unwrap_or_default().to_string(),
            },
        }
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() -> Result<(), SearchError> {
        let index = InMemoryVectorIndex::with_dimensions(2);
        index
            .upsert(
                &[chunk("a_0", "心内科"), chunk("b_0", "心内科"), chunk("c_0", "心内科")],
                &[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.8]],
            )
            .await?;

        let hits = index.search(&[1.0, 0.0], 2, None).await?;
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["b_0", "c_0"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 0.4).abs() < 1e-6);
        Ok(())
    }

    #[tokio::test]
    async fn filter_restricts_candidates() -> Result<(), SearchError> {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                &[chunk("a_0", "心内科"), chunk("b_0", "内分泌科")],
                &[vec![1.0, 0.0], vec![1.0, 0.0]],
            )
            .await?;

        let filter = MetadataFilter::department("内分泌科");
        let hits = index.search(&[1.0, 0.0], 5, Some(&filter)).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b_0");
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_existing_ids() -> Result<(), SearchError> {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[chunk("a_0", "心内科")], &[vec![1.0, 0.0]]).await?;
        index.upsert(&[chunk("a_0", "外科")], &[vec![0.0, 1.0]]).await?;

        assert_eq!(index.len().await, 1);
        let hits = index.search(&[0.0, 1.0], 1, None).await?;
        assert_eq!(hits[0].metadata.department, "外科");
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_inputs_are_rejected() {
        let index = InMemoryVectorIndex::with_dimensions(3);
        assert!(index.upsert(&[chunk("a_0", "x")], &[]).await.is_err());
        assert!(index.upsert(&[chunk("a_0", "x")], &[vec![1.0]]).await.is_err());
        assert!(index.search(&[1.0, 0.0], 1, None).await.is_err());
        assert!(index.is_empty().await);
    }
}
