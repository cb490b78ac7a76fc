use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "通用";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HitMetadata {
    pub category: String,
    pub department: String,
    pub source_doc_id: String,
}

/// One ranked neighbour returned by a [`crate::VectorIndex`] search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub metadata: HitMetadata,
    pub distance: f64,
}

impl RetrievalHit {
    /// Cosine similarity under the `1 - distance` convention used for filtering.
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Equality constraints applied by the index before ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct MetadataFilter {
    pub category: Option<String>,
    pub department: Option<String>,
    pub source_doc_id: Option<String>,
}

impl MetadataFilter {
    pub fn department(department: impl Into<String>) -> Self {
        Self {
            department: Some(department.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, metadata: &HitMetadata) -> bool {
        let check = |wanted: &Option<String>, actual: &str| {
            wanted.as_deref().map_or(true, |value| value == actual)
        };
        check(&self.category, &metadata.category)
            && check(&self.department, &metadata.department)
            && check(&self.source_doc_id, &metadata.source_doc_id)
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.department.is_none() && self.source_doc_id.is_none()
    }
}

/// A chunk ready to be written to the index next to its vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: HitMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub doc_id: String,
    pub title: String,
    pub category: String,
    pub text: String,
}

impl SourceDocument {
    pub fn category_or_default(&self) -> &str {
        if self.category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            self.category.trim()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub doc_id: String,
    pub chunk_count: usize,
    pub chunk_ids: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PatientProfile {
    pub age: u8,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
}

impl PatientProfile {
    pub fn describe(&self) -> String {
        let mut line = format!("患者信息：年龄{}岁，{}", self.age, self.gender);
        if !self.medical_history.is_empty() {
            line.push_str(&format!("，既往史：{}", self.medical_history.join(", ")));
        }
        if !self.current_medications.is_empty() {
            line.push_str(&format!("，当前用药：{}", self.current_medications.join(", ")));
        }
        line
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub patient_profile: Option<PatientProfile>,
    pub max_results: usize,
    pub department: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            patient_profile: None,
            max_results: 5,
            department: None,
        }
    }
}

/// Citation entry, one per distinct source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub source_doc_id: String,
    pub title: String,
    pub department: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TracedHit {
    pub id: String,
    pub content: String,
    pub similarity: f64,
    pub distance: f64,
    pub category: String,
    pub department: String,
}

impl From<&RetrievalHit> for TracedHit {
    fn from(hit: &RetrievalHit) -> Self {
        Self {
            id: hit.id.clone(),
            content: hit.text.clone(),
            similarity: hit.similarity(),
            distance: hit.distance,
            category: hit.metadata.category.clone(),
            department: hit.metadata.department.clone(),
        }
    }
}

/// Intermediate values of one `ask` call, kept for debugging display.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagTrace {
    pub embedding_dim: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub retrieved_docs: Vec<TracedHit>,
    pub final_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub references: Vec<Reference>,
    pub confidence: f64,
    pub similar_queries: Vec<String>,
    pub trace: Option<RagTrace>,
}
