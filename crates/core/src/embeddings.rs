use crate::traits::Encoder;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Hashed character-trigram encoder.
///
/// Deterministic and model-free; it stands in for a sentence-embedding model
/// when none is wired in. Texts shorter than three characters hash as a
/// single token so that short queries still produce a non-zero vector.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str, buckets: usize) -> usize {
        let mut hash = 1469598103934665603u64;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        (hash % buckets as u64) as usize
    }
}

impl Encoder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().filter(|ch| !ch.is_whitespace()).collect();

        if chars.is_empty() {
            return vector;
        }

        if chars.len() < 3 {
            let token = chars.iter().collect::<String>();
            let bucket = self.bucket(&token, vector.len());
            vector[bucket] = 1.0;
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let bucket = self.bucket(&token, vector.len());
            vector[bucket] += 1.0;
        }

        normalize_l2(&mut vector);
        vector
    }
}

pub fn normalize_l2(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}
