use crate::traits::VectorIndex;
use crate::{HitMetadata, IndexedChunk, MetadataFilter, RetrievalHit, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Qdrant collection configured with cosine distance. Qdrant reports a
/// similarity score; hits are converted to `distance = 1 - score`.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let url = format!("{}/collections/{}", self.endpoint, self.collection);
        let existing = self.client.get(&url).send().await?;
        if existing.status().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }
}

/// Qdrant only accepts unsigned integers or UUIDs as point ids.
pub fn point_id(chunk_id: &str) -> u64 {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

pub fn filter_payload(filter: &MetadataFilter) -> Option<Value> {
    let conditions: Vec<Value> = [
        ("category", &filter.category),
        ("department", &filter.department),
        ("source_doc_id", &filter.source_doc_id),
    ]
    .into_iter()
    .filter_map(|(key, value)| {
        value
            .as_ref()
            .map(|value| json!({"key": key, "match": {"value": value}}))
    })
    .collect();

    if conditions.is_empty() {
        None
    } else {
        Some(json!({ "must": conditions }))
    }
}

pub fn parse_search_hits(body: &Value) -> Vec<RetrievalHit> {
    let text_at = |hit: &Value, pointer: &str| {
        hit.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    body.pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
                    RetrievalHit {
                        id: text_at(hit, "/payload/chunk_id"),
                        text: text_at(hit, "/payload/text"),
                        metadata: HitMetadata {
                            category: text_at(hit, "/payload/category"),
                            department: text_at(hit, "/payload/department"),
                            source_doc_id: text_at(hit, "/payload/source_doc_id"),
                        },
                        distance: (1.0 - score).max(0.0),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VectorIndex for QdrantStore {
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

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| -> Result<Value, SearchError> {
                self.check_dimensions(embedding)?;
                Ok(json!({
                    "id": point_id(&chunk.chunk_id),
                    "vector": embedding,
                    "payload": {
                        "chunk_id": chunk.chunk_id,
                        "text": chunk.text,
                        "category": chunk.metadata.category,
                        "department": chunk.metadata.department,
                        "source_doc_id": chunk.metadata.source_doc_id,
                    },
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
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

        let mut body = json!({
            "vector": query_vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(payload) = filter.and_then(filter_payload) {
            body["filter"] = payload;
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let mut hits = parse_search_hits(&parsed);
        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        Ok(hits)
    }
}
